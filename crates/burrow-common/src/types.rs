//! Domain primitive types used across the burrow workspace.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BurrowError, Result};

/// Name of a launchable instance.
///
/// Names double as directory names in the store and as cgroup names, so
/// they may not contain a path separator or be a relative path token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceName(String);

impl InstanceName {
    /// Validates and wraps an instance name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, contains `/` or NUL, or is
    /// `.` or `..`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty()
            || name.contains('/')
            || name.contains('\0')
            || name == "."
            || name == ".."
        {
            return Err(BurrowError::Config {
                message: format!("invalid instance name: {name:?}"),
            });
        }
        Ok(Self(name))
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resource limits for one run.
///
/// All fields unset means no cgroup enforcement is requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU bandwidth in fractional cores.
    pub max_cpus: Option<f64>,
    /// Memory limit in bytes.
    pub max_memory_bytes: Option<u64>,
    /// Maximum number of processes.
    pub max_processes: Option<u64>,
}

impl ResourceLimits {
    /// Returns whether any limit was requested.
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.max_cpus.is_some_and(|c| c > 0.0)
            || self.max_memory_bytes.is_some_and(|m| m > 0)
            || self.max_processes.is_some_and(|p| p > 0)
    }

    /// Returns whether a memory cap was requested.
    #[must_use]
    pub fn caps_memory(&self) -> bool {
        self.max_memory_bytes.is_some_and(|m| m > 0)
    }
}

/// A host directory bind-mounted into the box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Path on the host.
    pub host_path: PathBuf,
    /// Path inside the box.
    pub box_path: PathBuf,
}

impl VolumeMount {
    /// Creates a volume mount request.
    #[must_use]
    pub fn new(host_path: impl Into<PathBuf>, box_path: impl Into<PathBuf>) -> Self {
        Self {
            host_path: host_path.into(),
            box_path: box_path.into(),
        }
    }

    /// Parses the `host:box` command-line form.
    ///
    /// # Errors
    ///
    /// Returns an error unless the spec has exactly two non-empty parts.
    pub fn parse(spec: &str) -> Result<Self> {
        let parts: Vec<&str> = spec.split(':').collect();
        match parts.as_slice() {
            [host, boxed] if !host.is_empty() && !boxed.is_empty() => Ok(Self::new(host, boxed)),
            _ => Err(BurrowError::Config {
                message: format!("invalid volume {spec:?}: must be formatted host:box"),
            }),
        }
    }

    /// Makes the host path absolute against `cwd` and roots the box path at `/`.
    #[must_use]
    pub fn normalized(&self, cwd: &Path) -> Self {
        let host_path = if self.host_path.is_absolute() {
            self.host_path.clone()
        } else {
            cwd.join(&self.host_path)
        };
        let box_path = if self.box_path.is_absolute() {
            self.box_path.clone()
        } else {
            Path::new("/").join(&self.box_path)
        };
        Self {
            host_path,
            box_path,
        }
    }
}

/// Lifecycle state of an instance, derived from its liveness record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceState {
    /// The recorded process is alive.
    Running,
    /// No record, or the recorded process is gone.
    Stopped,
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_name_rejects_path_tricks() {
        assert!(InstanceName::new("fluffy-otter-1a2b").is_ok());
        assert!(InstanceName::new("").is_err());
        assert!(InstanceName::new("a/b").is_err());
        assert!(InstanceName::new("..").is_err());
        assert!(InstanceName::new(".").is_err());
    }

    #[test]
    fn empty_limits_request_nothing() {
        assert!(!ResourceLimits::default().is_requested());
        let limits = ResourceLimits {
            max_processes: Some(64),
            ..ResourceLimits::default()
        };
        assert!(limits.is_requested());
        assert!(!limits.caps_memory());
    }

    #[test]
    fn volume_parse_requires_two_parts() {
        let v = VolumeMount::parse("./data:/data").unwrap();
        assert_eq!(v.host_path, PathBuf::from("./data"));
        assert_eq!(v.box_path, PathBuf::from("/data"));
        assert!(VolumeMount::parse("/a").is_err());
        assert!(VolumeMount::parse("/a:/b:/c").is_err());
        assert!(VolumeMount::parse(":/b").is_err());
    }

    #[test]
    fn normalization_anchors_both_sides() {
        let v = VolumeMount::new("data", "srv/data").normalized(Path::new("/home/me"));
        assert_eq!(v.host_path, PathBuf::from("/home/me/data"));
        assert_eq!(v.box_path, PathBuf::from("/srv/data"));

        let already = VolumeMount::new("/abs", "/in/box");
        assert_eq!(already.normalized(Path::new("/ignored")), already);
    }
}
