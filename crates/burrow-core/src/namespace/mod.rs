//! Linux namespace configuration for container isolation.
//!
//! A box is created directly inside its namespaces by the process-creation
//! call, so this module only describes *which* namespaces to create and how
//! ids map across the user namespace boundary.

pub mod user;
pub mod uts;

use std::fmt;

/// A namespace kind the box process is created in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceKind {
    /// Hostname and domain name.
    Uts,
    /// User and group ids.
    User,
    /// Mount table.
    Mount,
    /// System V IPC and POSIX message queues.
    Ipc,
    /// Process ids.
    Pid,
    /// Network stack.
    Network,
    /// Boot and monotonic clocks.
    Time,
    /// Cgroup root view.
    Cgroup,
}

/// `CLONE_NEWTIME`, whose bit overlaps the exit-signal field of legacy
/// `clone(2)` and is only accepted by `clone3(2)`.
const CLONE_NEWTIME: u64 = 0x0000_0080;

impl NamespaceKind {
    /// Every namespace kind, in the order they are listed in `clone(2)`.
    pub const ALL: [Self; 8] = [
        Self::Uts,
        Self::User,
        Self::Mount,
        Self::Ipc,
        Self::Pid,
        Self::Network,
        Self::Time,
        Self::Cgroup,
    ];

    /// Returns the `clone3(2)` flag creating this namespace.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn clone_flag(self) -> u64 {
        match self {
            Self::Uts => libc::CLONE_NEWUTS as u64,
            Self::User => libc::CLONE_NEWUSER as u64,
            Self::Mount => libc::CLONE_NEWNS as u64,
            Self::Ipc => libc::CLONE_NEWIPC as u64,
            Self::Pid => libc::CLONE_NEWPID as u64,
            Self::Network => libc::CLONE_NEWNET as u64,
            Self::Time => CLONE_NEWTIME,
            Self::Cgroup => libc::CLONE_NEWCGROUP as u64,
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uts => "uts",
            Self::User => "user",
            Self::Mount => "mnt",
            Self::Ipc => "ipc",
            Self::Pid => "pid",
            Self::Network => "net",
            Self::Time => "time",
            Self::Cgroup => "cgroup",
        };
        f.write_str(name)
    }
}

/// One line of a `uid_map`/`gid_map` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdMapping {
    /// First id inside the namespace.
    pub container_id: u32,
    /// First id on the host.
    pub host_id: u32,
    /// Number of consecutive ids mapped.
    pub size: u32,
}

impl IdMapping {
    /// Maps container root onto `host_id` and nothing else.
    #[must_use]
    pub const fn root_to(host_id: u32) -> Self {
        Self {
            container_id: 0,
            host_id,
            size: 1,
        }
    }
}

impl fmt::Display for IdMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.container_id, self.host_id, self.size)
    }
}

/// Namespaces and id mappings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceSpec {
    /// Namespaces the box is created in.
    pub kinds: Vec<NamespaceKind>,
    /// Mapping written to `uid_map`.
    pub uid_map: IdMapping,
    /// Mapping written to `gid_map`.
    pub gid_map: IdMapping,
}

impl NamespaceSpec {
    /// Every namespace, with container root mapped onto `uid`/`gid`.
    #[must_use]
    pub fn isolated(uid: u32, gid: u32) -> Self {
        Self {
            kinds: NamespaceKind::ALL.to_vec(),
            uid_map: IdMapping::root_to(uid),
            gid_map: IdMapping::root_to(gid),
        }
    }

    /// Every namespace, with container root mapped onto the invoking user.
    #[must_use]
    pub fn for_current_user() -> Self {
        let uid = nix::unistd::getuid().as_raw();
        let gid = nix::unistd::getgid().as_raw();
        tracing::debug!(uid, gid, "mapping container root to invoking user");
        Self::isolated(uid, gid)
    }

    /// Returns the combined `clone3(2)` namespace flags.
    #[must_use]
    pub fn clone_flags(&self) -> u64 {
        self.kinds.iter().fold(0, |flags, kind| flags | kind.clone_flag())
    }

    /// Returns whether `kind` is part of this spec.
    #[must_use]
    pub fn contains(&self, kind: NamespaceKind) -> bool {
        self.kinds.contains(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolated_spec_covers_every_namespace() {
        let spec = NamespaceSpec::isolated(1000, 100);
        for kind in NamespaceKind::ALL {
            assert!(spec.contains(kind), "{kind} missing");
        }
        assert_eq!(spec.uid_map.to_string(), "0 1000 1");
        assert_eq!(spec.gid_map.to_string(), "0 100 1");
    }

    #[test]
    fn clone_flags_are_distinct_bits() {
        let mut seen = 0_u64;
        for kind in NamespaceKind::ALL {
            let flag = kind.clone_flag();
            assert_eq!(flag.count_ones(), 1, "{kind}");
            assert_eq!(seen & flag, 0, "{kind} overlaps");
            seen |= flag;
        }
        assert_eq!(NamespaceSpec::isolated(0, 0).clone_flags(), seen);
    }

    #[test]
    fn current_user_mapping_uses_real_ids() {
        let spec = NamespaceSpec::for_current_user();
        assert_eq!(spec.uid_map.host_id, nix::unistd::getuid().as_raw());
        assert_eq!(spec.gid_map.host_id, nix::unistd::getgid().as_raw());
    }
}
