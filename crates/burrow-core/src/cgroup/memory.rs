//! Memory resource control via cgroups v2.
//!
//! Manages the `memory.max` hard limit.

use std::path::Path;

use burrow_common::error::Result;

/// Sets the hard memory limit for a cgroup.
///
/// # Errors
///
/// Returns an error if writing to `memory.max` fails.
pub fn set_memory_max(cgroup_path: &Path, bytes: u64) -> Result<()> {
    super::write_control(cgroup_path, "memory.max", &bytes.to_string(), "limit memory")?;
    tracing::debug!(bytes, "memory max limit set");
    Ok(())
}
