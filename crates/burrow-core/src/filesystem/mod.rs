//! Filesystem isolation inside the box's mount namespace.
//!
//! Device and volume bind mounts, the `chroot` jail, `/proc` and `/tmp`,
//! standard-stream links and small `/etc` rewrites. Everything here runs
//! in the re-executed child, never in the launching process.

pub mod chroot;
pub mod dev;
pub mod etc;
pub mod mount;

use std::path::{Component, Path, PathBuf};

/// Resolves an absolute in-box path below `root` on the host side.
///
/// Parent tokens are dropped so the result never leaves `root`.
#[must_use]
pub fn resolve_in_root(root: &Path, box_path: &Path) -> PathBuf {
    let mut resolved = root.to_path_buf();
    for component in box_path.components() {
        if let Component::Normal(part) = component {
            resolved.push(part);
        }
    }
    resolved
}
