//! Mount utilities for the box's filesystem setup.

use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};
use burrow_common::types::VolumeMount;
use nix::mount::{MntFlags, MsFlags};

use super::resolve_in_root;

fn mount_err(operation: &'static str, target: &Path, e: nix::Error) -> BurrowError {
    BurrowError::Isolation {
        operation,
        path: target.to_path_buf(),
        source: e.into(),
    }
}

/// Marks the whole mount tree private so nothing propagates to the host.
///
/// # Errors
///
/// Returns an error if the propagation change is refused.
pub fn make_private() -> Result<()> {
    let root = Path::new("/");
    nix::mount::mount(
        None::<&str>,
        root,
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|e| mount_err("make mounts private", root, e))?;
    tracing::debug!("mount propagation set to private");
    Ok(())
}

/// Bind-mounts `source` onto an existing `target`.
///
/// # Errors
///
/// Returns an error if `mount(2)` fails.
pub fn bind_mount(source: &Path, target: &Path) -> Result<()> {
    nix::mount::mount(
        Some(source),
        target,
        None::<&str>,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| mount_err("bind mount", target, e))?;
    tracing::debug!(
        source = %source.display(),
        target = %target.display(),
        "bind mount created"
    );
    Ok(())
}

/// Creates the volume's mount point below `root` and binds the host path
/// onto it. Returns the mount point.
///
/// # Errors
///
/// Returns an error if the mount point cannot be created or the bind fails.
pub fn bind_volume(root: &Path, volume: &VolumeMount) -> Result<PathBuf> {
    let target = resolve_in_root(root, &volume.box_path);
    ensure_dir(&target)?;
    bind_mount(&volume.host_path, &target)?;
    tracing::info!(
        host = %volume.host_path.display(),
        path = %volume.box_path.display(),
        "volume mounted"
    );
    Ok(target)
}

fn ensure_dir(target: &Path) -> Result<()> {
    std::fs::create_dir_all(target).map_err(|e| BurrowError::Io {
        path: target.to_path_buf(),
        source: e,
    })
}

/// Mounts a fresh `proc` at `target`, creating the directory if needed.
///
/// # Errors
///
/// Returns an error if the mount point cannot be created or `mount(2)` fails.
pub fn mount_proc(target: &Path) -> Result<ProcMount> {
    ensure_dir(target)?;
    nix::mount::mount(
        Some("proc"),
        target,
        Some("proc"),
        MsFlags::empty(),
        None::<&str>,
    )
    .map_err(|e| mount_err("mount proc", target, e))?;
    tracing::debug!(target = %target.display(), "proc mounted");
    Ok(ProcMount {
        target: target.to_path_buf(),
    })
}

/// Mounts an unbounded `tmpfs` at `target`, creating the directory if needed.
///
/// # Errors
///
/// Returns an error if the mount point cannot be created or `mount(2)` fails.
pub fn mount_tmpfs(target: &Path) -> Result<()> {
    ensure_dir(target)?;
    nix::mount::mount(
        Some("tmpfs"),
        target,
        Some("tmpfs"),
        MsFlags::empty(),
        None::<&str>,
    )
    .map_err(|e| mount_err("mount tmpfs", target, e))?;
    tracing::debug!(target = %target.display(), "tmpfs mounted");
    Ok(())
}

/// A mounted `proc`, lazily unmounted when dropped.
///
/// A successful `exec` replaces the process image without running the
/// drop, which leaves the mount in place for the command.
#[derive(Debug)]
#[must_use = "dropping the guard unmounts proc"]
pub struct ProcMount {
    target: PathBuf,
}

impl ProcMount {
    /// Returns the mount point.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl Drop for ProcMount {
    fn drop(&mut self) {
        if let Err(e) = nix::mount::umount2(&self.target, MntFlags::MNT_DETACH) {
            tracing::warn!(target = %self.target.display(), error = %e, "failed to unmount proc");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_target_is_created_before_binding() {
        let root = tempfile::tempdir().expect("tempdir");
        let volume = VolumeMount::new("/nonexistent/host/dir", "/data/in");
        // The host side does not exist, so only the mount point survives.
        let result = bind_volume(root.path(), &volume);
        assert!(root.path().join("data/in").is_dir());
        if let Err(e) = result {
            match e {
                BurrowError::Isolation { operation, path, .. } => {
                    assert_eq!(operation, "bind mount");
                    assert_eq!(path, root.path().join("data/in"));
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }
}
