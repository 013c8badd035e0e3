//! Linux capability management for least-privilege execution.
//!
//! Removes a fixed deny-list from the capability bounding set before the
//! boxed command is executed. Capabilities outside the list (`CHOWN`,
//! `SETUID`, `NET_BIND_SERVICE`, ...) stay available to root inside the
//! box's user namespace.

use burrow_common::error::{BurrowError, Result};
use caps::{CapSet, Capability};

/// Capabilities removed from the bounding set of every box.
pub const DENIED_CAPABILITIES: [Capability; 20] = [
    Capability::CAP_AUDIT_CONTROL,
    Capability::CAP_AUDIT_READ,
    Capability::CAP_AUDIT_WRITE,
    Capability::CAP_BLOCK_SUSPEND,
    Capability::CAP_DAC_READ_SEARCH,
    Capability::CAP_FSETID,
    Capability::CAP_IPC_LOCK,
    Capability::CAP_MAC_ADMIN,
    Capability::CAP_MAC_OVERRIDE,
    Capability::CAP_MKNOD,
    Capability::CAP_SETFCAP,
    Capability::CAP_SYSLOG,
    Capability::CAP_SYS_ADMIN,
    Capability::CAP_SYS_BOOT,
    Capability::CAP_SYS_MODULE,
    Capability::CAP_SYS_NICE,
    Capability::CAP_SYS_RAWIO,
    Capability::CAP_SYS_RESOURCE,
    Capability::CAP_SYS_TIME,
    Capability::CAP_WAKE_ALARM,
];

/// Drops every capability in [`DENIED_CAPABILITIES`] from the bounding set.
///
/// # Errors
///
/// Stops at the first capability that cannot be dropped and names it.
pub fn drop_denied() -> Result<()> {
    drop_from_bounding_set(&DENIED_CAPABILITIES)
}

/// Drops `capabilities` from the calling thread's bounding set, in order.
///
/// # Errors
///
/// Stops at the first capability that cannot be dropped and names it.
pub fn drop_from_bounding_set(capabilities: &[Capability]) -> Result<()> {
    for &cap in capabilities {
        caps::drop(None, CapSet::Bounding, cap).map_err(|e| BurrowError::Capability {
            capability: cap.to_string(),
            message: e.to_string(),
        })?;
    }
    tracing::info!(dropped = capabilities.len(), "capability bounding set reduced");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn deny_list_has_no_duplicates() {
        let unique: HashSet<_> = DENIED_CAPABILITIES.iter().collect();
        assert_eq!(unique.len(), DENIED_CAPABILITIES.len());
    }

    #[test]
    fn deny_list_covers_admin_classes() {
        for cap in [
            Capability::CAP_SYS_ADMIN,
            Capability::CAP_SYS_MODULE,
            Capability::CAP_SYS_BOOT,
            Capability::CAP_SYS_TIME,
            Capability::CAP_SYS_RAWIO,
            Capability::CAP_MAC_ADMIN,
            Capability::CAP_AUDIT_WRITE,
            Capability::CAP_SYS_RESOURCE,
        ] {
            assert!(DENIED_CAPABILITIES.contains(&cap), "{cap} must be dropped");
        }
    }

    #[test]
    fn box_root_keeps_ordinary_capabilities() {
        for cap in [
            Capability::CAP_CHOWN,
            Capability::CAP_SETUID,
            Capability::CAP_SETGID,
            Capability::CAP_NET_BIND_SERVICE,
            Capability::CAP_KILL,
        ] {
            assert!(!DENIED_CAPABILITIES.contains(&cap), "{cap} must stay");
        }
    }
}
