//! Process creation inside fresh namespaces.
//!
//! The box process is created with `clone3(2)` so that every namespace,
//! and optionally the target cgroup, is in place from its first
//! instruction. The child then waits on a pipe until the parent has
//! written its uid/gid maps, changes into its working directory and
//! `exec`s. A second, close-on-exec pipe reports an `exec` failure back
//! to the parent as a raw errno.
//!
//! Between `clone3` and `execve` the child runs in a copy of a possibly
//! multi-threaded address space, so it only makes raw async-signal-safe
//! system calls on data prepared beforehand.

use std::ffi::{CString, OsStr};
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use burrow_common::error::{BurrowError, Result};
use burrow_core::namespace::NamespaceSpec;
use burrow_core::namespace::user::write_id_maps;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;

/// `CLONE_INTO_CGROUP`: place the child in the cgroup given by `cgroup`.
const CLONE_INTO_CGROUP: u64 = 0x2_0000_0000;

/// Exit code of a child that could not reach `execve`.
const EXEC_FAILURE_EXIT_CODE: libc::c_int = 127;

/// Argument block of `clone3(2)`, laid out as `struct clone_args`.
#[repr(C)]
#[derive(Debug, Default)]
struct CloneArgs {
    flags: u64,
    pidfd: u64,
    child_tid: u64,
    parent_tid: u64,
    exit_signal: u64,
    stack: u64,
    stack_size: u64,
    tls: u64,
    set_tid: u64,
    set_tid_size: u64,
    cgroup: u64,
}

/// Descriptors installed as the box's standard streams.
///
/// `None` inherits the launcher's own stream.
#[derive(Debug, Default)]
pub struct StdioFds {
    /// Replacement for fd 0.
    pub stdin: Option<OwnedFd>,
    /// Replacement for fd 1.
    pub stdout: Option<OwnedFd>,
    /// Replacement for fd 2.
    pub stderr: Option<OwnedFd>,
}

impl StdioFds {
    fn redirections(&self) -> [(Option<RawFd>, RawFd); 3] {
        [
            (self.stdin.as_ref().map(AsRawFd::as_raw_fd), libc::STDIN_FILENO),
            (self.stdout.as_ref().map(AsRawFd::as_raw_fd), libc::STDOUT_FILENO),
            (self.stderr.as_ref().map(AsRawFd::as_raw_fd), libc::STDERR_FILENO),
        ]
    }
}

/// Everything needed to create one box process.
#[derive(Debug)]
pub struct SpawnRequest<'a> {
    /// Program to execute.
    pub executable: &'a Path,
    /// Arguments after `argv[0]`.
    pub args: &'a [String],
    /// The complete environment of the new process.
    pub env: &'a [(String, String)],
    /// Working directory entered right before `exec`.
    pub cwd: &'a Path,
    /// Namespaces to create and ids to map.
    pub namespaces: &'a NamespaceSpec,
    /// Cgroup directory the process is born into, if any.
    pub cgroup: Option<BorrowedFd<'a>>,
    /// Standard stream replacements.
    pub stdio: &'a StdioFds,
}

/// `execve` arguments converted up front, so the child never allocates.
struct ExecImage {
    path: CString,
    cwd: CString,
    _argv: Vec<CString>,
    _envp: Vec<CString>,
    argv_ptrs: Vec<*const libc::c_char>,
    envp_ptrs: Vec<*const libc::c_char>,
}

impl ExecImage {
    fn new(request: &SpawnRequest<'_>) -> Result<Self> {
        let path = c_string(request.executable.as_os_str())?;
        let cwd = c_string(request.cwd.as_os_str())?;

        let mut argv = Vec::with_capacity(request.args.len() + 1);
        argv.push(path.clone());
        for arg in request.args {
            argv.push(c_string(OsStr::new(arg))?);
        }
        let envp = request
            .env
            .iter()
            .map(|(key, value)| c_string(OsStr::new(&format!("{key}={value}"))))
            .collect::<Result<Vec<_>>>()?;

        let argv_ptrs = null_terminated(&argv);
        let envp_ptrs = null_terminated(&envp);
        Ok(Self {
            path,
            cwd,
            _argv: argv,
            _envp: envp,
            argv_ptrs,
            envp_ptrs,
        })
    }
}

fn c_string(value: &OsStr) -> Result<CString> {
    CString::new(value.as_bytes()).map_err(|_| BurrowError::Spawn {
        message: format!("{} contains a NUL byte", value.to_string_lossy()),
    })
}

fn null_terminated(strings: &[CString]) -> Vec<*const libc::c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

fn spawn_err(context: &str, e: impl std::fmt::Display) -> BurrowError {
    BurrowError::Spawn {
        message: format!("{context}: {e}"),
    }
}

/// Creates the box process and returns its PID once it has `exec`ed.
///
/// # Errors
///
/// Returns an error if the arguments cannot be converted, `clone3` is
/// refused, the id maps cannot be written or the `exec` fails. The child
/// is killed and reaped in every failure case after `clone3`.
pub fn spawn(request: &SpawnRequest<'_>) -> Result<Pid> {
    let image = ExecImage::new(request)?;
    let (sync_read, sync_write) =
        nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| spawn_err("creating sync pipe", e))?;
    let (err_read, err_write) =
        nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| spawn_err("creating error pipe", e))?;

    let mut args = CloneArgs {
        flags: request.namespaces.clone_flags(),
        exit_signal: u64::from(libc::SIGCHLD.unsigned_abs()),
        ..CloneArgs::default()
    };
    if let Some(cgroup) = request.cgroup {
        args.flags |= CLONE_INTO_CGROUP;
        args.cgroup = u64::from(cgroup.as_raw_fd().unsigned_abs());
    }

    // SAFETY: `args` is a valid `clone_args` of the size passed. Without
    // CLONE_VM the child gets a private copy of the address space and the
    // child branch below only performs async-signal-safe calls.
    let ret = unsafe {
        libc::syscall(
            libc::SYS_clone3,
            &raw mut args,
            std::mem::size_of::<CloneArgs>(),
        )
    };
    if ret < 0 {
        return Err(spawn_err("clone3", std::io::Error::last_os_error()));
    }
    if ret == 0 {
        run_child(
            &image,
            request.stdio,
            sync_read.as_raw_fd(),
            sync_write.as_raw_fd(),
            err_read.as_raw_fd(),
            err_write.as_raw_fd(),
        );
    }

    let pid = Pid::from_raw(i32::try_from(ret).map_err(|e| spawn_err("clone3 returned", e))?);
    drop(sync_read);
    drop(err_write);
    tracing::debug!(pid = pid.as_raw(), "box process created");

    if let Err(e) = release_child(pid, request.namespaces, sync_write) {
        kill_and_reap(pid);
        return Err(e);
    }

    let mut report = Vec::with_capacity(4);
    if let Err(e) = File::from(err_read).read_to_end(&mut report) {
        kill_and_reap(pid);
        return Err(spawn_err("reading exec status", e));
    }
    if let Ok(errno) = <[u8; 4]>::try_from(report.as_slice()) {
        kill_and_reap(pid);
        let cause = std::io::Error::from_raw_os_error(i32::from_ne_bytes(errno));
        return Err(spawn_err(
            &format!("exec {}", request.executable.display()),
            cause,
        ));
    }

    tracing::info!(
        pid = pid.as_raw(),
        executable = %request.executable.display(),
        "box process started"
    );
    Ok(pid)
}

/// Maps ids for the held child, then lets it continue.
fn release_child(pid: Pid, namespaces: &NamespaceSpec, sync_write: OwnedFd) -> Result<()> {
    write_id_maps(pid.as_raw(), namespaces)?;
    File::from(sync_write)
        .write_all(&[0])
        .map_err(|e| spawn_err("releasing child", e))
}

/// Child side of `clone3`. Never returns.
fn run_child(
    image: &ExecImage,
    stdio: &StdioFds,
    sync_read: RawFd,
    sync_write: RawFd,
    err_read: RawFd,
    err_write: RawFd,
) -> ! {
    // SAFETY: only raw system calls on descriptors and pointers prepared
    // before the clone; no allocation, no locks.
    unsafe {
        let _ = libc::close(sync_write);
        let _ = libc::close(err_read);

        let mut byte = 0_u8;
        loop {
            let n = libc::read(sync_read, (&raw mut byte).cast(), 1);
            if n == 1 {
                break;
            }
            if n == 0 || Errno::last() != Errno::EINTR {
                // The parent gave up before releasing us.
                libc::_exit(EXEC_FAILURE_EXIT_CODE);
            }
        }

        for (source, target) in stdio.redirections() {
            let Some(source) = source else { continue };
            if libc::dup2(source, target) < 0 {
                child_fail(err_write);
            }
        }
        if libc::chdir(image.cwd.as_ptr()) < 0 {
            child_fail(err_write);
        }
        let _ = libc::execve(
            image.path.as_ptr(),
            image.argv_ptrs.as_ptr(),
            image.envp_ptrs.as_ptr(),
        );
        child_fail(err_write)
    }
}

/// Reports the current errno to the parent and exits.
unsafe fn child_fail(err_write: RawFd) -> ! {
    let errno = Errno::last_raw().to_ne_bytes();
    // SAFETY: writes a stack buffer to a descriptor owned by this process.
    unsafe {
        let _ = libc::write(err_write, errno.as_ptr().cast(), errno.len());
        libc::_exit(EXEC_FAILURE_EXIT_CODE)
    }
}

/// Waits for `pid` to terminate and maps its status.
///
/// # Errors
///
/// Returns [`BurrowError::ExitStatus`] for a nonzero exit,
/// [`BurrowError::Signaled`] for death by signal and
/// [`BurrowError::NoProcessState`] when the kernel reports nothing.
pub fn wait(pid: Pid) -> Result<()> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, 0)) => {
                tracing::info!(pid = pid.as_raw(), "box exited cleanly");
                return Ok(());
            }
            Ok(WaitStatus::Exited(_, code)) => {
                tracing::info!(pid = pid.as_raw(), code, "box exited with failure");
                return Err(BurrowError::ExitStatus { code });
            }
            Ok(WaitStatus::Signaled(_, signal, _)) => {
                tracing::info!(pid = pid.as_raw(), signal = signal.as_str(), "box killed by signal");
                return Err(BurrowError::Signaled {
                    signal: signal.as_str().to_string(),
                });
            }
            Ok(other) => tracing::debug!(?other, "ignoring non-terminal wait status"),
            Err(Errno::EINTR) => {}
            Err(e) => {
                return Err(BurrowError::NoProcessState {
                    pid: pid.as_raw(),
                    message: e.to_string(),
                });
            }
        }
    }
}

/// Kills `pid` and reaps it, ignoring a process that is already gone.
pub fn kill_and_reap(pid: Pid) {
    if let Err(e) = kill(pid, Signal::SIGKILL) {
        tracing::debug!(pid = pid.as_raw(), error = %e, "kill failed");
    }
    loop {
        match waitpid(pid, None) {
            Err(Errno::EINTR) => {}
            Ok(WaitStatus::Exited(..) | WaitStatus::Signaled(..)) | Err(_) => break,
            Ok(_) => {}
        }
    }
    tracing::debug!(pid = pid.as_raw(), "box process killed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_args_match_kernel_layout() {
        // CLONE_ARGS_SIZE_VER2
        assert_eq!(std::mem::size_of::<CloneArgs>(), 88);
    }

    #[test]
    fn exec_image_is_null_terminated() {
        let spec = NamespaceSpec::isolated(0, 0);
        let stdio = StdioFds::default();
        let args = ["echo".to_string(), "hi".to_string()];
        let env = [("A".to_string(), "1".to_string())];
        let request = SpawnRequest {
            executable: Path::new("/proc/self/exe"),
            args: &args,
            env: &env,
            cwd: Path::new("/"),
            namespaces: &spec,
            cgroup: None,
            stdio: &stdio,
        };
        let image = ExecImage::new(&request).expect("image");
        assert_eq!(image.argv_ptrs.len(), 4);
        assert!(image.argv_ptrs[3].is_null());
        assert_eq!(image.envp_ptrs.len(), 2);
        assert!(image.envp_ptrs[1].is_null());
        assert_eq!(image._envp[0].to_str().expect("utf8"), "A=1");
        assert_eq!(image._argv[0], image.path);
    }

    #[test]
    fn nul_bytes_are_rejected_before_cloning() {
        let spec = NamespaceSpec::isolated(0, 0);
        let stdio = StdioFds::default();
        let args = ["bad\0arg".to_string()];
        let request = SpawnRequest {
            executable: Path::new("/bin/true"),
            args: &args,
            env: &[],
            cwd: Path::new("/"),
            namespaces: &spec,
            cgroup: None,
            stdio: &stdio,
        };
        assert!(matches!(spawn(&request), Err(BurrowError::Spawn { .. })));
    }

    #[test]
    fn stdio_defaults_to_inherit() {
        for (source, _) in StdioFds::default().redirections() {
            assert!(source.is_none());
        }
    }

    #[test]
    fn wait_on_unknown_child_has_no_state() {
        let err = wait(Pid::from_raw(999_999_999)).unwrap_err();
        assert!(matches!(err, BurrowError::NoProcessState { .. }));
    }
}
