//! Integration tests for the burrow runtime.
//!
//! The first group only touches the filesystem. The others create real
//! namespaced processes and need unprivileged user namespaces; those
//! tests are ignored by default:
//!
//! ```text
//! cargo test -p burrow-runtime -- --ignored
//! ```

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::{Duration, Instant};

use burrow_common::config::BurrowConfig;
use burrow_common::error::BurrowError;
use burrow_common::types::{InstanceName, InstanceState, VolumeMount};
use burrow_core::namespace::NamespaceSpec;
use burrow_runtime::engine::{Engine, RunOptions};
use burrow_runtime::process::{self, SpawnRequest, StdioFds};
use burrow_runtime::state::Store;
use burrow_runtime::volume;

fn engine_in(dir: &Path) -> Engine {
    let config = BurrowConfig {
        data_dir: dir.to_path_buf(),
        enforce_cgroups: false,
        ..BurrowConfig::default()
    };
    Engine::with_executable(config, "/nonexistent/burrow")
}

// ── Store and liveness ───────────────────────────────────────────────

#[test]
fn stale_record_does_not_block_and_is_reported_stopped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(dir.path());
    let name = InstanceName::new("stale").expect("name");
    let entry = engine.store().create(&name).expect("create");
    entry.liveness().write(999_999_999).expect("write");

    let statuses = engine.list().expect("list");
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].state, InstanceState::Stopped);

    // Past the guard the launch fails on the missing executable, not on
    // a conflict.
    let err = engine.run(&name, RunOptions::default()).unwrap_err();
    assert!(!matches!(err, BurrowError::AlreadyRunning { .. }), "{err}");
}

#[test]
fn live_record_is_a_conflict_naming_the_pid() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = engine_in(dir.path());
    let name = InstanceName::new("live").expect("name");
    let entry = engine.store().create(&name).expect("create");
    let own = i32::try_from(std::process::id()).expect("pid");
    entry.liveness().write(own).expect("write");

    let err = engine.run(&name, RunOptions::default()).unwrap_err();
    assert!(matches!(err, BurrowError::AlreadyRunning { pid, .. } if pid == own));
    assert!(err.to_string().contains(&own.to_string()));
}

#[test]
fn store_ignores_stray_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::new(dir.path());
    let _ = store.create(&InstanceName::new("real").expect("name")).expect("create");
    std::fs::write(store.entries_dir().join("notes.txt"), "x").expect("write");

    let names: Vec<String> = store.list().expect("list").into_iter().map(|s| s.name).collect();
    assert_eq!(names, ["real"]);
}

// ── Volume codec across the boundary ─────────────────────────────────

#[test]
fn decode_of_encode_is_normalize() {
    let cwd = Path::new("/home/user/project");
    let requested = vec![
        VolumeMount::new("src", "app/src"),
        VolumeMount::new("/var/cache/apk", "/var/cache/apk"),
        VolumeMount::new("../shared", "shared"),
    ];
    let expected: Vec<VolumeMount> = requested.iter().map(|v| v.normalized(cwd)).collect();
    let decoded = volume::decode(&volume::encode(&requested, cwd).expect("encode")).expect("decode");
    assert_eq!(decoded, expected);
    assert!(decoded.iter().all(|v| v.host_path.is_absolute() && v.box_path.is_absolute()));
}

// ── Namespaced processes ─────────────────────────────────────────────

fn spawn_in_namespaces(program: &str, args: &[&str]) -> burrow_common::error::Result<nix::unistd::Pid> {
    let spec = NamespaceSpec::for_current_user();
    let stdio = StdioFds::default();
    let args: Vec<String> = args.iter().map(ToString::to_string).collect();
    process::spawn(&SpawnRequest {
        executable: Path::new(program),
        args: &args,
        env: &[("PATH".to_string(), "/bin:/usr/bin".to_string())],
        cwd: Path::new("/"),
        namespaces: &spec,
        cgroup: None,
        stdio: &stdio,
    })
}

#[test]
#[ignore = "needs unprivileged user namespaces"]
fn clean_exit_is_ok() {
    let pid = spawn_in_namespaces("/bin/sh", &["-c", "exit 0"]).expect("spawn");
    process::wait(pid).expect("clean exit");
}

#[test]
#[ignore = "needs unprivileged user namespaces"]
fn nonzero_exit_is_a_typed_status() {
    let pid = spawn_in_namespaces("/bin/sh", &["-c", "exit 42"]).expect("spawn");
    let err = process::wait(pid).unwrap_err();
    assert!(matches!(err, BurrowError::ExitStatus { code: 42 }));
    assert_eq!(err.to_string(), "exit status 42");
}

#[test]
#[ignore = "needs unprivileged user namespaces"]
fn box_runs_as_root_pid_one() {
    let pid = spawn_in_namespaces("/bin/sh", &["-c", "test $$ -eq 1 && test $(id -u) -eq 0"])
        .expect("spawn");
    process::wait(pid).expect("pid 1 and uid 0 inside the box");
}

#[test]
#[ignore = "needs unprivileged user namespaces"]
fn signal_death_is_distinct() {
    let pid = spawn_in_namespaces("/bin/sleep", &["30"]).expect("spawn");
    nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGKILL).expect("kill");
    match process::wait(pid).unwrap_err() {
        BurrowError::Signaled { signal } => assert_eq!(signal, "SIGKILL"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
#[ignore = "needs unprivileged user namespaces"]
fn exec_failure_is_reported_as_spawn_error() {
    let err = spawn_in_namespaces("/nonexistent/program", &[]).unwrap_err();
    match err {
        BurrowError::Spawn { message } => assert!(message.contains("/nonexistent/program")),
        other => panic!("unexpected error: {other}"),
    }
}

// ── Launch failure paths ─────────────────────────────────────────────

/// An engine whose box process is a plain `sleep`, so it is still running
/// when a later launch step fails.
fn sleeping_engine(dir: &Path, cgroup_root: Option<&Path>, network_helper: &str) -> Engine {
    let config = BurrowConfig {
        data_dir: dir.to_path_buf(),
        enforce_cgroups: cgroup_root.is_some(),
        cgroup_root: cgroup_root.map(Path::to_path_buf),
        network_helper: network_helper.to_string(),
        ..BurrowConfig::default()
    };
    Engine::with_executable(config, "/bin/sleep")
}

fn sleep_for_a_while(network: bool) -> RunOptions {
    RunOptions {
        command: vec!["30".to_string()],
        network,
        ..RunOptions::default()
    }
}

#[test]
#[ignore = "needs unprivileged user namespaces"]
fn missing_network_helper_kills_the_box_and_removes_its_cgroup() {
    let dir = tempfile::tempdir().expect("tempdir");
    let slice = tempfile::tempdir().expect("tempdir");
    let engine = sleeping_engine(dir.path(), Some(slice.path()), "burrow-no-such-helper");
    let name = InstanceName::new("nonet").expect("name");
    let entry = engine.store().create(&name).expect("create");

    let started = Instant::now();
    let err = engine.run(&name, sleep_for_a_while(true)).unwrap_err();
    assert!(matches!(err, BurrowError::Network { .. }), "{err}");
    assert!(started.elapsed() < Duration::from_secs(10), "box was waited on, not killed");

    assert!(entry.liveness().read().expect("record").is_some());
    assert!(entry.liveness().live_pid().expect("record").is_none());
    assert!(!slice.path().join("burrow-nonet").exists());
}

#[test]
#[ignore = "needs unprivileged user namespaces and a non-root user"]
fn unwritable_liveness_record_kills_the_box() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = sleeping_engine(dir.path(), None, "slirp4netns");
    let name = InstanceName::new("readonly").expect("name");
    let entry = engine.store().create(&name).expect("create");
    std::fs::set_permissions(entry.dir(), std::fs::Permissions::from_mode(0o555)).expect("chmod");

    let started = Instant::now();
    let result = engine.run(&name, sleep_for_a_while(false));
    std::fs::set_permissions(entry.dir(), std::fs::Permissions::from_mode(0o755)).expect("chmod");

    match result.unwrap_err() {
        BurrowError::Io { path, .. } => assert_eq!(path, entry.liveness().path()),
        other => panic!("unexpected error: {other}"),
    }
    assert!(started.elapsed() < Duration::from_secs(10), "box was waited on, not killed");
    assert!(entry.liveness().read().expect("record").is_none());
}
