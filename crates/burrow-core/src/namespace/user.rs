//! User namespace id mapping.
//!
//! Maps container root onto the unprivileged invoking user, enabling
//! rootless boxes. The maps are written by the parent while the child is
//! held at its start barrier.

use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};

use super::NamespaceSpec;

/// Writes the `setgroups`, `uid_map` and `gid_map` files of process `pid`.
///
/// `setgroups` must be denied before an unprivileged writer may install a
/// gid map, so it goes first.
///
/// # Errors
///
/// Returns an error naming the first file that cannot be written.
pub fn write_id_maps(pid: i32, spec: &NamespaceSpec) -> Result<()> {
    write_id_maps_in(&PathBuf::from(format!("/proc/{pid}")), spec)?;
    tracing::debug!(
        pid,
        uid_map = %spec.uid_map,
        gid_map = %spec.gid_map,
        "wrote uid/gid maps"
    );
    Ok(())
}

/// Writes the id-map files below an arbitrary `/proc/<pid>`-shaped directory.
///
/// # Errors
///
/// Returns an error naming the first file that cannot be written.
pub fn write_id_maps_in(proc_dir: &Path, spec: &NamespaceSpec) -> Result<()> {
    write_proc_file(&proc_dir.join("setgroups"), "deny")?;
    write_proc_file(&proc_dir.join("uid_map"), &spec.uid_map.to_string())?;
    write_proc_file(&proc_dir.join("gid_map"), &spec.gid_map.to_string())
}

fn write_proc_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).map_err(|e| BurrowError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
