//! Unified error types for the burrow workspace.
//!
//! Variants follow the launcher's failure taxonomy: conflicts, resource
//! setup, spawn, bootstrap, command exit status and teardown are all
//! structurally distinct so callers can tell "the command failed" apart
//! from "the launcher failed".

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BurrowError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// The instance already has a live process.
    #[error("{name} is already running with pid {pid}")]
    AlreadyRunning {
        /// Instance name.
        name: String,
        /// PID found in the liveness record.
        pid: i32,
    },

    /// Creating, configuring or removing a cgroup failed.
    #[error("cgroup {operation} failed at {path}: {source}")]
    Cgroup {
        /// Operation that failed, e.g. `limit memory`.
        operation: &'static str,
        /// Cgroup directory or control file involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Dropping a capability from the bounding set failed.
    #[error("dropping capability {capability}: {message}")]
    Capability {
        /// Name of the capability that could not be dropped.
        capability: String,
        /// Description of the failure.
        message: String,
    },

    /// Building or loading the syscall filter failed.
    #[error("syscall filter: {message}")]
    Seccomp {
        /// Description of the failure.
        message: String,
    },

    /// Encoding or decoding the volume list failed.
    #[error("volume codec: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// Locating the executable or creating the container process failed.
    #[error("spawn failed: {message}")]
    Spawn {
        /// Description of the failure.
        message: String,
    },

    /// Starting the user-mode network helper failed.
    #[error("network attachment failed: {message}")]
    Network {
        /// Description of the failure.
        message: String,
    },

    /// A mount, root change or other isolation system call failed.
    #[error("{operation} failed at {path}: {source}")]
    Isolation {
        /// Operation that failed, e.g. `mount proc`.
        operation: &'static str,
        /// Path the operation targeted.
        path: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A child-side isolation step failed before `exec`.
    #[error("bootstrap step `{step}` failed: {source}")]
    Bootstrap {
        /// Name of the failing step.
        step: &'static str,
        /// Underlying failure.
        source: Box<BurrowError>,
    },

    /// The box process exited with the reserved bootstrap failure code.
    ///
    /// A command that itself exits with that code is indistinguishable
    /// from a failed bootstrap and is reported here as well.
    #[error("box bootstrap failed before exec (exit status {code})")]
    BootstrapFailed {
        /// Exit code reported by the kernel.
        code: i32,
    },

    /// The boxed command exited with a nonzero status.
    #[error("exit status {code}")]
    ExitStatus {
        /// Exit code reported by the kernel.
        code: i32,
    },

    /// The boxed command was terminated by a signal.
    #[error("terminated by signal {signal}")]
    Signaled {
        /// Signal name.
        signal: String,
    },

    /// The kernel reported no state at all for the supervised process.
    #[error("no process state for pid {pid}: {message}")]
    NoProcessState {
        /// PID that was being waited on.
        pid: i32,
        /// Description of the wait failure.
        message: String,
    },

    /// The run failed and so did its teardown.
    #[error("{primary} (teardown also failed: {teardown})")]
    Teardown {
        /// Failure of the run itself.
        primary: Box<BurrowError>,
        /// Failure of the cleanup that followed.
        teardown: Box<BurrowError>,
    },

    /// Serialization or deserialization of configuration failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl BurrowError {
    /// Tags an error with the bootstrap step it came from.
    #[must_use]
    pub fn in_step(self, step: &'static str) -> Self {
        Self::Bootstrap {
            step,
            source: Box::new(self),
        }
    }

    /// Returns the exit code when this error reports the boxed command's
    /// own exit status rather than a launcher failure.
    #[must_use]
    pub fn command_exit_code(&self) -> Option<i32> {
        match self {
            Self::ExitStatus { code } => Some(*code),
            Self::Teardown { primary, .. } => primary.command_exit_code(),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BurrowError>;

/// Combines the outcome of a run with the outcome of its cleanup.
///
/// A teardown failure never hides the primary result: both are kept when
/// both fail, and a teardown failure after success becomes the error.
///
/// # Errors
///
/// Returns the primary error, the teardown error, or both combined.
pub fn join<T>(primary: Result<T>, teardown: Result<()>) -> Result<T> {
    match (primary, teardown) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(teardown)) => Err(teardown),
        (Err(primary), Ok(())) => Err(primary),
        (Err(primary), Err(teardown)) => Err(BurrowError::Teardown {
            primary: Box::new(primary),
            teardown: Box::new(teardown),
        }),
    }
}
