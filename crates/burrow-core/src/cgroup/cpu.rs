//! CPU bandwidth control via cgroups v2.
//!
//! Manages `cpu.max` with a fixed 100ms period.

use std::path::Path;

use burrow_common::constants::CPU_PERIOD_US;
use burrow_common::error::Result;

/// Formats the `cpu.max` value granting `cores` fractional cores.
///
/// The quota is `round(period * cores)` microseconds per period.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn cpu_max_value(cores: f64) -> String {
    let quota = (CPU_PERIOD_US as f64 * cores).round().max(0.0) as u64;
    format!("{quota} {CPU_PERIOD_US}")
}

/// Sets the CPU bandwidth limit.
///
/// # Errors
///
/// Returns an error if writing to `cpu.max` fails.
pub fn set_cpu_max(cgroup_path: &Path, cores: f64) -> Result<()> {
    let value = cpu_max_value(cores);
    super::write_control(cgroup_path, "cpu.max", &value, "limit cpus")?;
    tracing::debug!(cores, value = %value, "CPU max quota set");
    Ok(())
}
