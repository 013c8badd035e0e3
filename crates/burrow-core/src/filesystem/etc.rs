//! Small rewrites of `/etc` inside the box.

use std::path::Path;

use burrow_common::error::{BurrowError, Result};

/// Rewrites `hostname_file` to hold `name` if the file exists.
///
/// Best-effort: a missing or read-only file is logged and skipped.
/// Returns whether the file was rewritten.
pub fn rewrite_hostname_file(hostname_file: &Path, name: &str) -> bool {
    if !hostname_file.exists() {
        return false;
    }
    match std::fs::write(hostname_file, format!("{name}\n")) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(path = %hostname_file.display(), error = %e, "hostname file not rewritten");
            false
        }
    }
}

/// Points the resolver in `etc_dir` at `nameserver`.
///
/// Nothing is written when `etc_dir` does not exist. Returns whether the
/// file was written.
///
/// # Errors
///
/// Returns an error if the directory exists but the file cannot be written.
pub fn write_resolv_conf(etc_dir: &Path, nameserver: &str) -> Result<bool> {
    if !etc_dir.is_dir() {
        return Ok(false);
    }
    let path = etc_dir.join("resolv.conf");
    // A dangling symlink (e.g. into a systemd-resolved runtime dir) would
    // make the write fail, so replace the entry itself.
    if path.symlink_metadata().is_ok_and(|m| m.file_type().is_symlink()) {
        std::fs::remove_file(&path).map_err(|e| BurrowError::Io {
            path: path.clone(),
            source: e,
        })?;
    }
    std::fs::write(&path, format!("nameserver {nameserver}\n")).map_err(|e| BurrowError::Io {
        path: path.clone(),
        source: e,
    })?;
    tracing::debug!(path = %path.display(), nameserver, "resolver configured");
    Ok(true)
}
