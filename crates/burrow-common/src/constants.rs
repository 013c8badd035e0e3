//! System-wide constants and default paths.

use std::path::PathBuf;

/// Default base directory for burrow data when no home directory is usable.
pub const SYSTEM_DATA_DIR: &str = "/var/lib/burrow";

/// Returns the data directory, preferring `$HOME/.burrow` and falling back
/// to `/var/lib/burrow`.
pub fn default_data_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        let user_dir = PathBuf::from(home).join(".burrow");
        if std::fs::create_dir_all(&user_dir).is_ok() {
            return user_dir;
        }
    }
    PathBuf::from(SYSTEM_DATA_DIR)
}

// ── Store layout ─────────────────────────────────────────────────────

/// Directory under the data dir holding one subdirectory per instance.
pub const ENTRIES_DIR: &str = "entries";

/// Name of the extracted root filesystem inside an instance directory.
pub const ROOTFS_DIR: &str = "boxfs";

/// Name of the liveness record inside an instance directory.
pub const PID_FILE: &str = "container.pid";

// ── Cgroups ──────────────────────────────────────────────────────────

/// Cgroups v2 unified hierarchy mount point.
pub const CGROUP_V2_PATH: &str = "/sys/fs/cgroup";

/// Prefix for per-instance cgroup directory names.
pub const CGROUP_PREFIX: &str = "burrow-";

/// Fixed `cpu.max` period in microseconds.
pub const CPU_PERIOD_US: u64 = 100_000;

/// Process ceiling written to `pids.max` when no explicit limit is given.
pub const DEFAULT_MAX_PROCESSES: u64 = 10_000;

// ── Re-exec boundary ─────────────────────────────────────────────────

/// Sentinel marking child mode; its value is the instance name.
pub const ENV_EXEC: &str = "BURROW_EXEC";

/// Hex-encoded volume list.
pub const ENV_MOUNTS: &str = "BURROW_MOUNTS";

/// `1` when a memory cap is active and `/tmp` must not be an unbounded tmpfs.
pub const ENV_NO_TMPFS: &str = "BURROW_NO_TMPFS";

/// `1` when user-mode networking is attached to the instance.
pub const ENV_NETWORK: &str = "BURROW_NETWORK";

/// Disables cgroup enforcement when set to a non-empty value.
pub const ENV_NO_CGROUP: &str = "BURROW_NO_CGROUP";

/// Exit code the child uses when bootstrap fails before `exec`.
pub const BOOTSTRAP_FAILURE_EXIT_CODE: i32 = 125;

// ── Inside the box ───────────────────────────────────────────────────

/// Search path handed to the boxed command.
pub const BOX_PATH: &str = "/bin:/sbin:/usr/bin:/usr/sbin";

/// The complete environment of the boxed command.
pub const BOX_ENV: [&str; 3] = [
    "PATH=/bin:/sbin:/usr/bin:/usr/sbin",
    "LANG=C.UTF-8",
    "CHARSET=UTF-8",
];

/// Command run when none is given.
pub const DEFAULT_COMMAND: &str = "sh";

/// Host device nodes bind-mounted into every box.
pub const BOX_DEVICES: [&str; 6] = [
    "/dev/null",
    "/dev/zero",
    "/dev/full",
    "/dev/tty",
    "/dev/random",
    "/dev/urandom",
];

// ── Networking ───────────────────────────────────────────────────────

/// User-mode network helper binary.
pub const NETWORK_HELPER: &str = "slirp4netns";

/// MTU configured on the box's tap device.
pub const NETWORK_MTU: u32 = 65520;

/// Name of the tap device created inside the box.
pub const NETWORK_TAP_DEVICE: &str = "tap0";

/// DNS forwarder address provided by the network helper.
pub const NETWORK_NAMESERVER: &str = "10.0.2.3";
