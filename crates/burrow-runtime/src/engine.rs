//! Launch orchestration on the parent side.
//!
//! [`Engine::run`] guards on the liveness record, prepares the instance's
//! cgroup, re-executes the launcher binary as the box process, records its
//! PID, optionally attaches networking and supervises it to completion.
//! The cgroup is removed on every path once it exists.

use std::fs::File;
use std::os::fd::AsFd;
use std::path::{Path, PathBuf};

use burrow_common::config::BurrowConfig;
use burrow_common::constants::{
    BOOTSTRAP_FAILURE_EXIT_CODE, CGROUP_PREFIX, ENV_EXEC, ENV_MOUNTS, ENV_NETWORK, ENV_NO_TMPFS,
};
use burrow_common::error::{self, BurrowError, Result};
use burrow_common::types::{InstanceName, ResourceLimits, VolumeMount};
use burrow_core::cgroup::Cgroup;
use burrow_core::namespace::NamespaceSpec;
use burrow_core::network::NetworkHelper;

use crate::process::{self, SpawnRequest, StdioFds};
use crate::state::{Entry, InstanceStatus, Store};
use crate::volume;

/// Environment variable forwarded to the box process so bootstrap can log.
const LOG_FILTER_ENV: &str = "RUST_LOG";

/// Per-run options.
#[derive(Debug, Default)]
pub struct RunOptions {
    /// Command and arguments; empty runs the default shell.
    pub command: Vec<String>,
    /// Resource limits. All unset requests no enforcement.
    pub limits: ResourceLimits,
    /// Host directories to bind into the box.
    pub volumes: Vec<VolumeMount>,
    /// Whether to attach user-mode networking.
    pub network: bool,
    /// Standard stream replacements.
    pub stdio: StdioFds,
}

/// The launcher's context object.
///
/// Holds configuration, the instance store and the path of the binary that
/// is re-executed as the box process.
#[derive(Debug)]
pub struct Engine {
    config: BurrowConfig,
    store: Store,
    executable: PathBuf,
}

impl Engine {
    /// Creates an engine that re-executes the running binary.
    ///
    /// # Errors
    ///
    /// Returns an error if the running binary's path cannot be resolved.
    pub fn new(config: BurrowConfig) -> Result<Self> {
        let executable = std::env::current_exe().map_err(|e| BurrowError::Spawn {
            message: format!("locating own executable: {e}"),
        })?;
        Ok(Self::with_executable(config, executable))
    }

    /// Creates an engine that re-executes `executable` instead.
    #[must_use]
    pub fn with_executable(config: BurrowConfig, executable: impl Into<PathBuf>) -> Self {
        let store = Store::new(&config.data_dir);
        Self {
            config,
            store,
            executable: executable.into(),
        }
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &BurrowConfig {
        &self.config
    }

    /// Returns the instance store.
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// Returns the binary re-executed as the box process.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Lists instances with their re-derived state.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn list(&self) -> Result<Vec<InstanceStatus>> {
        self.store.list()
    }

    /// Runs `name` to completion.
    ///
    /// The liveness check and the PID write are not atomic: two launches
    /// of the same instance racing each other can both pass the guard.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::AlreadyRunning`] if a live process is
    /// recorded, [`BurrowError::BootstrapFailed`] if the box exited with
    /// the reserved bootstrap code, [`BurrowError::ExitStatus`] or
    /// [`BurrowError::Signaled`] if the command itself failed, and an
    /// infrastructure error for anything else. A failed cgroup removal is
    /// joined with the result.
    pub fn run(&self, name: &InstanceName, options: RunOptions) -> Result<()> {
        let entry = self.store.entry(name);
        if !entry.exists() {
            return Err(BurrowError::NotFound {
                kind: "instance",
                id: name.to_string(),
            });
        }
        if let Some(pid) = entry.liveness().live_pid()? {
            return Err(BurrowError::AlreadyRunning {
                name: name.to_string(),
                pid,
            });
        }

        if !self.config.enforce_cgroups {
            tracing::info!(name = %name, "cgroup handling disabled");
            return self.launch(&entry, &options, None);
        }

        let cgroup_name = format!("{CGROUP_PREFIX}{name}");
        let cgroup = match &self.config.cgroup_root {
            Some(root) => Cgroup::open_in(root, &cgroup_name)?,
            None => Cgroup::open(&cgroup_name)?,
        };
        let result = self.launch(&entry, &options, Some(&cgroup));
        error::join(result, cgroup.delete())
    }

    fn launch(&self, entry: &Entry, options: &RunOptions, cgroup: Option<&Cgroup>) -> Result<()> {
        let cgroup_dir = match cgroup {
            Some(cgroup) if options.limits.is_requested() => {
                cgroup.apply_limits(&options.limits, self.config.default_max_processes)?;
                Some(cgroup.open_dir()?)
            }
            _ => None,
        };

        let cwd = std::env::current_dir().map_err(|e| BurrowError::Io {
            path: PathBuf::from("."),
            source: e,
        })?;
        let env = child_env(entry.name(), options, &cwd)?;
        let namespaces = NamespaceSpec::for_current_user();
        let rootfs = entry.rootfs();

        let pid = process::spawn(&SpawnRequest {
            executable: &self.executable,
            args: &options.command,
            env: &env,
            cwd: &rootfs,
            namespaces: &namespaces,
            cgroup: cgroup_dir.as_ref().map(File::as_fd),
            stdio: &options.stdio,
        })?;
        drop(cgroup_dir);

        if let Err(e) = entry.liveness().write(pid.as_raw()) {
            process::kill_and_reap(pid);
            return Err(e);
        }

        let _network = if options.network {
            match NetworkHelper::start(&self.config.network_helper, self.config.network_mtu, pid.as_raw()) {
                Ok(helper) => Some(helper),
                Err(e) => {
                    process::kill_and_reap(pid);
                    return Err(e);
                }
            }
        } else {
            None
        };

        tracing::info!(name = %entry.name(), pid = pid.as_raw(), "supervising box");
        process::wait(pid).map_err(classify_exit)
    }
}

/// Separates a failed child bootstrap from the command's own exit status.
///
/// The bootstrap reports failure only through its exit code, so a command
/// that itself exits with [`BOOTSTRAP_FAILURE_EXIT_CODE`] is classified as
/// a bootstrap failure too.
fn classify_exit(err: BurrowError) -> BurrowError {
    match err {
        BurrowError::ExitStatus { code } if code == BOOTSTRAP_FAILURE_EXIT_CODE => {
            BurrowError::BootstrapFailed { code }
        }
        other => other,
    }
}

/// Builds the complete environment of the re-executed box process.
///
/// # Errors
///
/// Returns an error if the volume list cannot be encoded.
pub fn child_env(
    name: &InstanceName,
    options: &RunOptions,
    cwd: &Path,
) -> Result<Vec<(String, String)>> {
    let mut env = vec![
        (ENV_EXEC.to_string(), name.to_string()),
        (ENV_MOUNTS.to_string(), volume::encode(&options.volumes, cwd)?),
    ];
    if options.limits.caps_memory() {
        env.push((ENV_NO_TMPFS.to_string(), "1".to_string()));
    }
    if options.network {
        env.push((ENV_NETWORK.to_string(), "1".to_string()));
    }
    if let Ok(filter) = std::env::var(LOG_FILTER_ENV) {
        env.push((LOG_FILTER_ENV.to_string(), filter));
    }
    Ok(env)
}
