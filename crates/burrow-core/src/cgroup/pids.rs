//! Process count control via cgroups v2.

use std::path::Path;

use burrow_common::error::Result;

/// Sets the maximum number of processes in a cgroup.
///
/// # Errors
///
/// Returns an error if writing to `pids.max` fails.
pub fn set_pids_max(cgroup_path: &Path, max: u64) -> Result<()> {
    super::write_control(cgroup_path, "pids.max", &max.to_string(), "limit pids")?;
    tracing::debug!(max, "pids max set");
    Ok(())
}
