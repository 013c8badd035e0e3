//! User-mode network attachment.
//!
//! Networking is delegated to an external helper (`slirp4netns` by
//! default) that joins the box's network namespace through its PID and
//! plugs a tap device into it. The launcher starts it and kills it when
//! the run ends; there is no readiness handshake.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use burrow_common::constants::NETWORK_TAP_DEVICE;
use burrow_common::error::{BurrowError, Result};

/// Builds the helper's argument list for the box process `pid`.
#[must_use]
pub fn helper_args(mtu: u32, pid: i32) -> Vec<String> {
    vec![
        "--configure".into(),
        format!("--mtu={mtu}"),
        "--disable-host-loopback".into(),
        pid.to_string(),
        NETWORK_TAP_DEVICE.into(),
    ]
}

/// A running network helper, terminated when dropped.
#[derive(Debug)]
pub struct NetworkHelper {
    child: Option<Child>,
    program: PathBuf,
}

impl NetworkHelper {
    /// Locates `helper` on `PATH` and starts it against the namespaces of `pid`.
    ///
    /// # Errors
    ///
    /// Returns an error if the helper cannot be found or started.
    pub fn start(helper: &str, mtu: u32, pid: i32) -> Result<Self> {
        let program = which::which(helper).map_err(|e| BurrowError::Network {
            message: format!("{helper} not found: {e}"),
        })?;
        let child = Command::new(&program)
            .args(helper_args(mtu, pid))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| BurrowError::Network {
                message: format!("starting {}: {e}", program.display()),
            })?;
        tracing::info!(
            helper = %program.display(),
            helper_pid = child.id(),
            pid,
            mtu,
            "network helper started"
        );
        Ok(Self {
            child: Some(child),
            program,
        })
    }

    /// Returns the helper's own PID while it is running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Kills the helper and reaps it. Calling this more than once is a no-op.
    pub fn terminate(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Err(e) = child.kill() {
            tracing::debug!(helper = %self.program.display(), error = %e, "helper already gone");
        }
        match child.wait() {
            Ok(status) => tracing::debug!(helper = %self.program.display(), %status, "network helper stopped"),
            Err(e) => tracing::warn!(helper = %self.program.display(), error = %e, "failed to reap network helper"),
        }
    }
}

impl Drop for NetworkHelper {
    fn drop(&mut self) {
        self.terminate();
    }
}
