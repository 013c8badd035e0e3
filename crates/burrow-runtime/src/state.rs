//! Instance store and liveness records.
//!
//! The store is a plain directory tree: `<data>/entries/<name>/` holds the
//! extracted root filesystem (`boxfs/`) and, once the instance has been
//! launched, a `container.pid` record. Nothing is cached: whether an
//! instance is running is re-derived from `/proc` every time it is asked.

use std::path::{Path, PathBuf};

use burrow_common::constants::{ENTRIES_DIR, PID_FILE, ROOTFS_DIR};
use burrow_common::error::{BurrowError, Result};
use burrow_common::types::{InstanceName, InstanceState};
use serde::{Deserialize, Serialize};

/// Directory-backed store of launchable instances.
#[derive(Debug, Clone)]
pub struct Store {
    entries: PathBuf,
}

impl Store {
    /// Opens the store rooted at `data_dir`. Nothing is created yet.
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            entries: data_dir.join(ENTRIES_DIR),
        }
    }

    /// Returns the directory holding one subdirectory per instance.
    #[must_use]
    pub fn entries_dir(&self) -> &Path {
        &self.entries
    }

    /// Returns the entry for `name`, whether or not it exists.
    #[must_use]
    pub fn entry(&self, name: &InstanceName) -> Entry {
        Entry {
            name: name.clone(),
            dir: self.entries.join(name.as_str()),
        }
    }

    /// Allocates the working directory and empty root of a new entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn create(&self, name: &InstanceName) -> Result<Entry> {
        let entry = self.entry(name);
        let rootfs = entry.rootfs();
        std::fs::create_dir_all(&rootfs).map_err(|e| BurrowError::Io {
            path: rootfs.clone(),
            source: e,
        })?;
        tracing::info!(name = %name, path = %entry.dir.display(), "entry allocated");
        Ok(entry)
    }

    /// Lists every entry with its re-derived state, sorted by name.
    ///
    /// A missing store is an empty store. Directory names that are not
    /// valid instance names are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or a record is corrupt.
    pub fn list(&self) -> Result<Vec<InstanceStatus>> {
        let dir = match std::fs::read_dir(&self.entries) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(BurrowError::Io {
                    path: self.entries.clone(),
                    source: e,
                });
            }
        };

        let mut statuses = Vec::new();
        for item in dir {
            let item = item.map_err(|e| BurrowError::Io {
                path: self.entries.clone(),
                source: e,
            })?;
            if !item.path().is_dir() {
                continue;
            }
            let Ok(name) = InstanceName::new(item.file_name().to_string_lossy().into_owned()) else {
                continue;
            };
            statuses.push(self.entry(&name).status()?);
        }
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        tracing::debug!(count = statuses.len(), "store listed");
        Ok(statuses)
    }
}

/// One instance's working directory.
#[derive(Debug, Clone)]
pub struct Entry {
    name: InstanceName,
    dir: PathBuf,
}

impl Entry {
    /// Returns the instance name.
    #[must_use]
    pub const fn name(&self) -> &InstanceName {
        &self.name
    }

    /// Returns the working directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the root filesystem directory.
    #[must_use]
    pub fn rootfs(&self) -> PathBuf {
        self.dir.join(ROOTFS_DIR)
    }

    /// Returns whether the root filesystem has been materialized.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.rootfs().is_dir()
    }

    /// Returns the liveness record of this entry.
    #[must_use]
    pub fn liveness(&self) -> LivenessRecord {
        LivenessRecord::at(self.dir.join(PID_FILE))
    }

    /// Returns the entry's current status.
    ///
    /// # Errors
    ///
    /// Returns an error if the liveness record exists but is corrupt.
    pub fn status(&self) -> Result<InstanceStatus> {
        let pid = self.liveness().live_pid()?;
        Ok(InstanceStatus {
            name: self.name.to_string(),
            pid,
            state: if pid.is_some() {
                InstanceState::Running
            } else {
                InstanceState::Stopped
            },
        })
    }
}

/// A PID persisted as decimal text.
#[derive(Debug, Clone)]
pub struct LivenessRecord {
    path: PathBuf,
}

impl LivenessRecord {
    /// Binds a record to `path`.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the record file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the recorded PID. A missing record is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a PID.
    pub fn read(&self) -> Result<Option<i32>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BurrowError::Io {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };
        raw.trim()
            .parse::<i32>()
            .ok()
            .filter(|&pid| pid > 0)
            .map(Some)
            .ok_or_else(|| BurrowError::Config {
                message: format!("corrupt pid record at {}: {:?}", self.path.display(), raw.trim()),
            })
    }

    /// Replaces the record with `pid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, pid: i32) -> Result<()> {
        std::fs::write(&self.path, pid.to_string()).map_err(|e| BurrowError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        tracing::debug!(pid, path = %self.path.display(), "pid recorded");
        Ok(())
    }

    /// Returns the recorded PID only if that process is alive right now.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but is unreadable or corrupt.
    pub fn live_pid(&self) -> Result<Option<i32>> {
        Ok(self.read()?.filter(|&pid| process_alive(pid)))
    }
}

/// Returns whether `pid` names a live process in this PID namespace.
#[must_use]
pub fn process_alive(pid: i32) -> bool {
    pid > 0 && Path::new("/proc").join(pid.to_string()).exists()
}

/// Name, PID and derived state of one instance, as shown by `ps`.
///
/// Exit codes of finished runs are not recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStatus {
    /// Instance name.
    pub name: String,
    /// PID of the live process, if any.
    pub pid: Option<i32>,
    /// Derived lifecycle state.
    pub state: InstanceState,
}
