//! Cgroups v2 resource management.
//!
//! Each run owns one directory under the invoking user's delegated
//! `app.slice`. Limits are plain writes to the `pids.max`, `cpu.max` and
//! `memory.max` control files; the directory is removed when the run ends.

pub mod cpu;
pub mod memory;
pub mod pids;

use std::fs::File;
use std::path::{Path, PathBuf};

use burrow_common::constants::CGROUP_V2_PATH;
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::ResourceLimits;

/// Handle to the cgroup of a single run.
#[derive(Debug)]
pub struct Cgroup {
    /// Path to this run's cgroup directory.
    path: PathBuf,
}

impl Cgroup {
    /// Opens (creating if needed) the cgroup `name` under the current
    /// user's `app.slice`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(name: &str) -> Result<Self> {
        let uid = nix::unistd::getuid().as_raw();
        Self::open_in(&user_app_slice(uid), name)
    }

    /// Opens (creating if needed) the cgroup `name` under `parent`.
    ///
    /// A pre-existing directory is reused.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a single path segment or the
    /// directory cannot be created.
    pub fn open_in(parent: &Path, name: &str) -> Result<Self> {
        let segment = sanitize(name);
        if segment.is_empty() {
            return Err(BurrowError::Config {
                message: format!("invalid cgroup name: {name:?}"),
            });
        }
        let path = parent.join(segment);
        match std::fs::create_dir(&path) {
            Ok(()) => tracing::info!(path = %path.display(), "cgroup created"),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::debug!(path = %path.display(), "reusing existing cgroup");
            }
            Err(e) => {
                return Err(BurrowError::Cgroup {
                    operation: "create",
                    path,
                    source: e,
                });
            }
        }
        Ok(Self { path })
    }

    /// Wraps an existing cgroup directory without touching the filesystem.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the cgroup directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the last path component, i.e. the cgroup's own name.
    #[must_use]
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Caps the number of processes in the cgroup.
    ///
    /// # Errors
    ///
    /// Returns an error if `pids.max` cannot be written.
    pub fn limit_pids(&self, max: u64) -> Result<()> {
        pids::set_pids_max(&self.path, max)
    }

    /// Caps CPU bandwidth to `cores` fractional cores.
    ///
    /// # Errors
    ///
    /// Returns an error if `cpu.max` cannot be written.
    pub fn limit_cpus(&self, cores: f64) -> Result<()> {
        cpu::set_cpu_max(&self.path, cores)
    }

    /// Caps resident memory to `bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if `memory.max` cannot be written.
    pub fn limit_memory(&self, bytes: u64) -> Result<()> {
        memory::set_memory_max(&self.path, bytes)
    }

    /// Writes every requested limit.
    ///
    /// The process ceiling always gets a value once enforcement is on:
    /// the explicit limit if given, `default_max_processes` otherwise.
    ///
    /// # Errors
    ///
    /// Returns the first control-file write that fails.
    pub fn apply_limits(&self, limits: &ResourceLimits, default_max_processes: u64) -> Result<()> {
        let max_processes = limits
            .max_processes
            .filter(|&p| p > 0)
            .unwrap_or(default_max_processes);
        self.limit_pids(max_processes)?;
        if let Some(cores) = limits.max_cpus.filter(|&c| c > 0.0) {
            self.limit_cpus(cores)?;
        }
        if let Some(bytes) = limits.max_memory_bytes.filter(|&m| m > 0) {
            self.limit_memory(bytes)?;
        }
        Ok(())
    }

    /// Moves an existing process into this cgroup.
    ///
    /// # Errors
    ///
    /// Returns an error if writing to `cgroup.procs` fails.
    pub fn add_pid(&self, pid: i32) -> Result<()> {
        write_control(&self.path, "cgroup.procs", &pid.to_string(), "add pid")?;
        tracing::debug!(pid, "added process to cgroup");
        Ok(())
    }

    /// Opens the cgroup directory for binding a new process at creation time.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be opened.
    pub fn open_dir(&self) -> Result<File> {
        File::open(&self.path).map_err(|e| BurrowError::Cgroup {
            operation: "open",
            path: self.path.clone(),
            source: e,
        })
    }

    /// Removes the cgroup directory.
    ///
    /// The kernel only allows this once no process is left inside.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be removed.
    pub fn delete(&self) -> Result<()> {
        std::fs::remove_dir(&self.path).map_err(|e| BurrowError::Cgroup {
            operation: "delete",
            path: self.path.clone(),
            source: e,
        })?;
        tracing::info!(path = %self.path.display(), "cgroup deleted");
        Ok(())
    }
}

/// Returns the `app.slice` directory systemd delegates to user `uid`.
#[must_use]
pub fn user_app_slice(uid: u32) -> PathBuf {
    PathBuf::from(CGROUP_V2_PATH)
        .join("user.slice")
        .join(format!("user-{uid}.slice"))
        .join(format!("user@{uid}.service"))
        .join("app.slice")
}

/// Writes `value` to the control file `file` below `cgroup_path`.
pub(crate) fn write_control(
    cgroup_path: &Path,
    file: &str,
    value: &str,
    operation: &'static str,
) -> Result<()> {
    let segment = sanitize(file);
    if segment.is_empty() {
        return Err(BurrowError::Config {
            message: format!("invalid cgroup control file: {file:?}"),
        });
    }
    let path = cgroup_path.join(segment);
    std::fs::write(&path, value).map_err(|e| BurrowError::Cgroup {
        operation,
        path,
        source: e,
    })
}

/// Reduces `segment` to a single path component inside the cgroup.
///
/// Separators are stripped and the parent token becomes empty.
fn sanitize(segment: &str) -> String {
    let cleaned = segment.replace('/', "");
    if cleaned == ".." || cleaned == "." {
        String::new()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_slice_path_is_derived_from_uid() {
        assert_eq!(
            user_app_slice(1000),
            PathBuf::from("/sys/fs/cgroup/user.slice/user-1000.slice/user@1000.service/app.slice")
        );
    }

    #[test]
    fn sanitize_strips_separators_and_parent_token() {
        assert_eq!(sanitize("cpu.max"), "cpu.max");
        assert_eq!(sanitize("../cpu.max"), "..cpu.max");
        assert_eq!(sanitize("a/b"), "ab");
        assert_eq!(sanitize(".."), "");
        assert_eq!(sanitize("/../"), "");
    }

    #[test]
    fn open_creates_and_reuses_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = Cgroup::open_in(dir.path(), "burrow-box").expect("create");
        assert!(first.path().is_dir());
        let second = Cgroup::open_in(dir.path(), "burrow-box").expect("reuse");
        assert_eq!(first.path(), second.path());
        assert_eq!(second.name(), "burrow-box");
    }

    #[test]
    fn open_rejects_escaping_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(Cgroup::open_in(dir.path(), "..").is_err());
    }

    #[test]
    fn open_under_missing_parent_reports_create() {
        let err = Cgroup::open_in(Path::new("/nonexistent/slice"), "x").unwrap_err();
        assert!(matches!(err, BurrowError::Cgroup { operation: "create", .. }));
    }

    #[test]
    fn limits_write_control_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cgroup = Cgroup::from_path(dir.path());
        let limits = ResourceLimits {
            max_cpus: Some(1.5),
            max_memory_bytes: Some(64 * 1024 * 1024),
            max_processes: None,
        };
        cgroup.apply_limits(&limits, 10_000).expect("apply");

        let read = |f: &str| std::fs::read_to_string(dir.path().join(f)).expect("read");
        assert_eq!(read("pids.max"), "10000");
        assert_eq!(read("cpu.max"), "150000 100000");
        assert_eq!(read("memory.max"), "67108864");
    }

    #[test]
    fn unset_limits_leave_files_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cgroup = Cgroup::from_path(dir.path());
        let limits = ResourceLimits {
            max_processes: Some(32),
            ..ResourceLimits::default()
        };
        cgroup.apply_limits(&limits, 10_000).expect("apply");
        assert_eq!(std::fs::read_to_string(dir.path().join("pids.max")).unwrap(), "32");
        assert!(!dir.path().join("cpu.max").exists());
        assert!(!dir.path().join("memory.max").exists());
    }

    #[test]
    fn write_failure_names_the_operation() {
        let cgroup = Cgroup::from_path("/nonexistent/cgroup");
        let err = cgroup.limit_memory(1).unwrap_err();
        assert!(matches!(err, BurrowError::Cgroup { operation: "limit memory", .. }));
    }

    #[test]
    fn delete_removes_empty_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cgroup = Cgroup::open_in(dir.path(), "burrow-gone").expect("create");
        cgroup.delete().expect("delete");
        assert!(!cgroup.path().exists());
        assert!(cgroup.delete().is_err());
    }

    #[test]
    fn add_pid_writes_procs_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cgroup = Cgroup::from_path(dir.path());
        cgroup.add_pid(4242).expect("add");
        assert_eq!(std::fs::read_to_string(dir.path().join("cgroup.procs")).unwrap(), "4242");
    }
}
