//! Device nodes and standard-stream links inside the box.

use std::os::unix::fs::symlink;
use std::path::Path;

use burrow_common::constants::BOX_DEVICES;
use burrow_common::error::{BurrowError, Result};

use super::mount::bind_mount;
use super::resolve_in_root;

/// Stream links placed in `/dev`, each pointing into `/proc/self/fd`.
pub const STREAM_LINKS: [(&str, &str); 4] = [
    ("stdin", "/proc/self/fd/0"),
    ("stdout", "/proc/self/fd/1"),
    ("stderr", "/proc/self/fd/2"),
    ("fd", "/proc/self/fd"),
];

/// Binds each host device in [`BOX_DEVICES`] into `root`.
///
/// An empty regular file is created as each mount point first.
///
/// # Errors
///
/// Returns an error if a mount point cannot be created or a bind fails.
pub fn bind_devices(root: &Path) -> Result<()> {
    for device in BOX_DEVICES {
        let host = Path::new(device);
        let target = resolve_in_root(root, host);
        create_mount_point(&target)?;
        bind_mount(host, &target)?;
    }
    tracing::debug!(count = BOX_DEVICES.len(), "devices bound");
    Ok(())
}

fn create_mount_point(target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BurrowError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(target)
        .map(drop)
        .map_err(|e| BurrowError::Io {
            path: target.to_path_buf(),
            source: e,
        })
}

/// Replaces the stream entries of `dev_dir` with links into `/proc/self/fd`.
///
/// Removing whatever was there before is best-effort; creating the link
/// is not.
///
/// # Errors
///
/// Returns an error if a link cannot be created.
pub fn link_standard_streams(dev_dir: &Path) -> Result<()> {
    for (name, target) in STREAM_LINKS {
        let link = dev_dir.join(name);
        if let Err(e) = remove_any(&link) {
            tracing::debug!(link = %link.display(), error = %e, "could not remove old entry");
        }
        symlink(target, &link).map_err(|e| BurrowError::Io {
            path: link.clone(),
            source: e,
        })?;
    }
    tracing::debug!(dev = %dev_dir.display(), "standard streams linked");
    Ok(())
}

fn remove_any(path: &Path) -> std::io::Result<()> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) => Err(e),
    }
}
