//! Child-side bootstrap of a re-executed box process.
//!
//! The launcher binary re-executes itself inside fresh namespaces with
//! [`ENV_EXEC`] set to the instance name. That process finishes the
//! isolation and then replaces itself with the requested command. The
//! order of the steps matters: every mount happens while the process
//! still holds its namespace capabilities, and the syscall filter comes
//! last so nothing before it trips over its own restrictions.

use std::convert::Infallible;
use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use burrow_common::constants::{
    BOX_ENV, BOX_PATH, DEFAULT_COMMAND, ENV_EXEC, ENV_NETWORK, ENV_NO_TMPFS, NETWORK_NAMESERVER,
};
use burrow_common::error::{BurrowError, Result};
use burrow_core::filesystem::{chroot, dev, etc, mount};
use burrow_core::namespace::uts;
use burrow_core::{capability, seccomp};

use crate::volume;

/// Returns the instance name if this process is a re-executed box.
///
/// The front end calls this before doing anything else.
#[must_use]
pub fn requested_instance() -> Option<String> {
    std::env::var(ENV_EXEC).ok()
}

fn flag(name: &str) -> bool {
    std::env::var_os(name).is_some_and(|v| v == "1")
}

/// Runs every bootstrap step, then `exec`s the command.
///
/// `args` is the process's own argument list without `argv[0]`.
///
/// # Errors
///
/// Only returns on failure, with the error tagged by its step.
pub fn boot(name: &str, args: Vec<OsString>) -> Result<Infallible> {
    let volumes = volume::decode_from_env().map_err(|e| e.in_step("decode volumes"))?;
    let root = Path::new(".");

    mount::make_private().map_err(|e| e.in_step("private mounts"))?;
    dev::bind_devices(root).map_err(|e| e.in_step("bind devices"))?;
    for volume in &volumes {
        let target = mount::bind_volume(root, volume).map_err(|e| e.in_step("bind volumes"))?;
        tracing::debug!(mount_point = %target.display(), "volume bound below new root");
    }

    chroot::enter_root(root).map_err(|e| e.in_step("chroot"))?;
    let proc_mount = mount::mount_proc(Path::new("/proc")).map_err(|e| e.in_step("mount proc"))?;
    if !flag(ENV_NO_TMPFS) {
        mount::mount_tmpfs(Path::new("/tmp")).map_err(|e| e.in_step("mount tmpfs"))?;
    }

    uts::set_hostname(name).map_err(|e| e.in_step("hostname"))?;
    let _ = etc::rewrite_hostname_file(Path::new("/etc/hostname"), name);
    if flag(ENV_NETWORK) {
        let written = etc::write_resolv_conf(Path::new("/etc"), NETWORK_NAMESERVER)
            .map_err(|e| e.in_step("resolver"))?;
        tracing::debug!(written, "resolver configuration");
    }
    dev::link_standard_streams(Path::new("/dev")).map_err(|e| e.in_step("stream links"))?;

    capability::drop_denied().map_err(|e| e.in_step("capabilities"))?;
    seccomp::install().map_err(|e| e.in_step("syscall filter"))?;

    tracing::debug!(proc = %proc_mount.target().display(), "bootstrap complete");
    exec_command(args).map_err(|e| e.in_step("exec"))
}

/// Resolves the command against the box search path and `exec`s it with
/// the fixed box environment.
fn exec_command(args: Vec<OsString>) -> Result<Infallible> {
    let args = if args.is_empty() {
        vec![OsString::from(DEFAULT_COMMAND)]
    } else {
        args
    };
    let program = which::which_in(&args[0], Some(BOX_PATH), "/").map_err(|e| BurrowError::NotFound {
        kind: "command",
        id: format!("{}: {e}", args[0].to_string_lossy()),
    })?;

    let to_c = |bytes: &[u8]| {
        CString::new(bytes).map_err(|_| BurrowError::Config {
            message: format!("argument contains a NUL byte: {}", String::from_utf8_lossy(bytes)),
        })
    };
    let path = to_c(program.as_os_str().as_bytes())?;
    let argv = args
        .iter()
        .map(|a| to_c(a.as_bytes()))
        .collect::<Result<Vec<_>>>()?;
    let envp = BOX_ENV
        .iter()
        .map(|kv| to_c(kv.as_bytes()))
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(program = %program.display(), "executing command");
    nix::unistd::execve(&path, &argv, &envp).map_err(|e| BurrowError::Isolation {
        operation: "execve",
        path: program,
        source: e.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_command_names_it() {
        let err = exec_command(vec![OsString::from("burrow-no-such-command")]).unwrap_err();
        match err {
            BurrowError::NotFound { kind, id } => {
                assert_eq!(kind, "command");
                assert!(id.contains("burrow-no-such-command"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn nul_in_arguments_is_rejected_before_exec() {
        let err = exec_command(vec![OsString::from("sh"), OsString::from("a\0b")]);
        // Hosts without /bin/sh fail on lookup instead; neither path execs.
        assert!(err.is_err());
    }
}
