//! UTS namespace isolation.
//!
//! Gives the box its own hostname, set to the instance name.

use std::path::PathBuf;

use burrow_common::error::{BurrowError, Result};

/// Kernel file mirroring the namespace's hostname.
const HOSTNAME_SYSCTL: &str = "/proc/sys/kernel/hostname";

/// Sets the hostname inside the UTS namespace.
///
/// # Errors
///
/// Returns an error if `sethostname(2)` fails.
pub fn set_hostname(hostname: &str) -> Result<()> {
    nix::unistd::sethostname(hostname).map_err(|e| BurrowError::Isolation {
        operation: "sethostname",
        path: PathBuf::from(HOSTNAME_SYSCTL),
        source: e.into(),
    })?;
    tracing::debug!(hostname, "container hostname set");
    Ok(())
}
