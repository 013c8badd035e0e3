//! Configuration model for the burrow launcher.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{BurrowError, Result};

/// Root configuration for the launcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BurrowConfig {
    /// Base directory holding the instance store.
    pub data_dir: PathBuf,
    /// User-mode network helper binary, looked up on `PATH`.
    pub network_helper: String,
    /// MTU passed to the network helper.
    pub network_mtu: u32,
    /// `pids.max` value used when limits are enforced without an explicit
    /// process ceiling.
    pub default_max_processes: u64,
    /// Whether resource limits are written to a cgroup at all.
    pub enforce_cgroups: bool,
    /// Parent directory for per-instance cgroups. Unset means the invoking
    /// user's delegated `app.slice`.
    pub cgroup_root: Option<PathBuf>,
}

impl Default for BurrowConfig {
    fn default() -> Self {
        Self {
            data_dir: constants::default_data_dir(),
            network_helper: constants::NETWORK_HELPER.to_string(),
            network_mtu: constants::NETWORK_MTU,
            default_max_processes: constants::DEFAULT_MAX_PROCESSES,
            enforce_cgroups: true,
            cgroup_root: None,
        }
    }
}

impl BurrowConfig {
    /// Loads configuration from an optional JSON file, then applies
    /// environment overrides.
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| BurrowError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })?;
                serde_json::from_str(&raw)?
            }
            None => Self::default(),
        };
        let config = config.with_env_overrides();
        tracing::debug!(?config, "configuration loaded");
        Ok(config)
    }

    /// Disables cgroup enforcement when `BURROW_NO_CGROUP` is set.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if std::env::var_os(constants::ENV_NO_CGROUP).is_some_and(|v| !v.is_empty()) {
            self.enforce_cgroups = false;
        }
        self
    }
}
