//! Root filesystem switching via `chroot(2)`.
//!
//! The box's mount namespace is private and its capability set is reduced
//! afterwards, and `chroot` is denied by the syscall filter, so the jail
//! cannot be re-entered from inside.

use std::path::{Path, PathBuf};

use burrow_common::error::{BurrowError, Result};

/// Changes the root directory to `new_root` and moves into it.
///
/// # Errors
///
/// Returns an error if `chroot(2)` or the following `chdir("/")` fails.
pub fn enter_root(new_root: &Path) -> Result<()> {
    nix::unistd::chroot(new_root).map_err(|e| BurrowError::Isolation {
        operation: "chroot",
        path: new_root.to_path_buf(),
        source: e.into(),
    })?;
    nix::unistd::chdir("/").map_err(|e| BurrowError::Isolation {
        operation: "chdir",
        path: PathBuf::from("/"),
        source: e.into(),
    })?;
    tracing::info!(root = %new_root.display(), "entered box root");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_root_names_the_operation() {
        let err = enter_root(Path::new("/nonexistent/boxfs")).unwrap_err();
        match err {
            BurrowError::Isolation { operation, path, source } => {
                assert_eq!(operation, "chroot");
                assert_eq!(path, Path::new("/nonexistent/boxfs"));
                // Unprivileged callers are refused before the lookup happens.
                assert!(matches!(
                    source.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
