//! Syscall restriction via seccomp-BPF.
//!
//! The policy is allow-by-default with two declarative deny tables:
//! argument-conditional rules ([`ARG_RULES`]) and unconditional denials
//! ([`DENIED_SYSCALLS`]), both answered with `EPERM` instead of killing
//! the caller. A third table ([`FALLBACK_SYSCALLS`]) answers `ENOSYS` so
//! libc retries through an older syscall the rules can inspect. Every
//! program is compiled before anything is loaded, so a bad entry never
//! leaves a half-applied filter.

use std::collections::BTreeMap;

use burrow_common::error::{BurrowError, Result};
use seccompiler::{
    BpfProgram, SeccompAction, SeccompCmpArgLen, SeccompCmpOp, SeccompCondition, SeccompFilter,
    SeccompRule, TargetArch,
};

/// Denies `syscall` when `(arg[arg] & mask) == value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgRule {
    /// Syscall name, for auditing and error messages.
    pub syscall: &'static str,
    /// Syscall number on the build architecture.
    pub nr: i64,
    /// Zero-based argument position.
    pub arg: u8,
    /// Mask applied to the argument.
    pub mask: u64,
    /// Value the masked argument is compared with.
    pub value: u64,
}

/// Denies `syscall` whatever its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Denial {
    /// Syscall name.
    pub syscall: &'static str,
    /// Syscall number on the build architecture.
    pub nr: i64,
}

const S_ISUID: u64 = libc::S_ISUID as u64;
const S_ISGID: u64 = libc::S_ISGID as u64;
const CLONE_NEWUSER: u64 = libc::CLONE_NEWUSER as u64;

const fn masked(syscall: &'static str, nr: i64, arg: u8, bit: u64) -> ArgRule {
    ArgRule {
        syscall,
        nr,
        arg,
        mask: bit,
        value: bit,
    }
}

/// `chmod` only exists where the legacy syscall table is still wired up.
#[cfg(target_arch = "x86_64")]
const LEGACY_ARG_RULES: &[ArgRule] = &[
    masked("chmod", libc::SYS_chmod, 1, S_ISUID),
    masked("chmod", libc::SYS_chmod, 1, S_ISGID),
];

#[cfg(not(target_arch = "x86_64"))]
const LEGACY_ARG_RULES: &[ArgRule] = &[];

/// Argument-conditional denials: no set-id mode bits, no nested user namespaces.
pub const ARG_RULES: &[ArgRule] = &[
    masked("fchmod", libc::SYS_fchmod, 1, S_ISUID),
    masked("fchmod", libc::SYS_fchmod, 1, S_ISGID),
    masked("fchmodat", libc::SYS_fchmodat, 2, S_ISUID),
    masked("fchmodat", libc::SYS_fchmodat, 2, S_ISGID),
    masked("unshare", libc::SYS_unshare, 0, CLONE_NEWUSER),
    masked("clone", libc::SYS_clone, 0, CLONE_NEWUSER),
    masked("ioctl", libc::SYS_ioctl, 0, CLONE_NEWUSER),
];

/// Unconditional denials.
pub const DENIED_SYSCALLS: &[Denial] = &[
    Denial { syscall: "keyctl", nr: libc::SYS_keyctl },
    Denial { syscall: "add_key", nr: libc::SYS_add_key },
    Denial { syscall: "request_key", nr: libc::SYS_request_key },
    Denial { syscall: "ptrace", nr: libc::SYS_ptrace },
    Denial { syscall: "mbind", nr: libc::SYS_mbind },
    Denial { syscall: "migrate_pages", nr: libc::SYS_migrate_pages },
    Denial { syscall: "move_pages", nr: libc::SYS_move_pages },
    Denial { syscall: "set_mempolicy", nr: libc::SYS_set_mempolicy },
    Denial { syscall: "userfaultfd", nr: libc::SYS_userfaultfd },
    Denial { syscall: "perf_event_open", nr: libc::SYS_perf_event_open },
    Denial { syscall: "chroot", nr: libc::SYS_chroot },
];

/// Denied with `ENOSYS` so callers fall back to a filtered equivalent.
///
/// `clone3` passes its flags behind a pointer the filter cannot read, so
/// nested user namespaces would slip past the `clone` rule.
pub const FALLBACK_SYSCALLS: &[Denial] = &[Denial { syscall: "clone3", nr: libc::SYS_clone3 }];

/// Returns every conditional rule that applies on this architecture.
pub fn arg_rules() -> impl Iterator<Item = &'static ArgRule> {
    LEGACY_ARG_RULES.iter().chain(ARG_RULES)
}

fn seccomp_err(context: &str, e: impl std::fmt::Display) -> BurrowError {
    BurrowError::Seccomp {
        message: format!("{context}: {e}"),
    }
}

/// Compiles the deny tables into BPF programs without loading them.
///
/// The first program answers `EPERM`, the second `ENOSYS`.
///
/// # Errors
///
/// Returns an error if a rule cannot be expressed, a syscall appears in
/// more than one table, or the architecture is unsupported.
pub fn build_filter() -> Result<Vec<BpfProgram>> {
    let mut rules: BTreeMap<i64, Vec<SeccompRule>> = BTreeMap::new();

    for rule in arg_rules() {
        let condition = SeccompCondition::new(
            rule.arg,
            SeccompCmpArgLen::Dword,
            SeccompCmpOp::MaskedEq(rule.mask),
            rule.value,
        )
        .map_err(|e| seccomp_err(&format!("condition for {}", rule.syscall), e))?;
        let compiled = SeccompRule::new(vec![condition])
            .map_err(|e| seccomp_err(&format!("rule for {}", rule.syscall), e))?;
        rules.entry(rule.nr).or_default().push(compiled);
    }

    for denial in DENIED_SYSCALLS {
        if rules.insert(denial.nr, Vec::new()).is_some() {
            return Err(BurrowError::Seccomp {
                message: format!("{} is both conditionally and unconditionally denied", denial.syscall),
            });
        }
    }

    let mut fallback: BTreeMap<i64, Vec<SeccompRule>> = BTreeMap::new();
    for denial in FALLBACK_SYSCALLS {
        if rules.contains_key(&denial.nr) || fallback.insert(denial.nr, Vec::new()).is_some() {
            return Err(BurrowError::Seccomp {
                message: format!("{} is listed in more than one table", denial.syscall),
            });
        }
    }

    let arch: TargetArch = std::env::consts::ARCH
        .try_into()
        .map_err(|e| seccomp_err("target architecture", e))?;

    let programs = vec![
        compile(rules, libc::EPERM, arch)?,
        compile(fallback, libc::ENOSYS, arch)?,
    ];
    tracing::debug!(
        instructions = programs.iter().map(Vec::len).sum::<usize>(),
        "syscall filter compiled"
    );
    Ok(programs)
}

fn compile(rules: BTreeMap<i64, Vec<SeccompRule>>, errno: i32, arch: TargetArch) -> Result<BpfProgram> {
    #[allow(clippy::cast_sign_loss)]
    let deny = SeccompAction::Errno(errno as u32);
    let filter = SeccompFilter::new(rules, SeccompAction::Allow, deny, arch)
        .map_err(|e| seccomp_err("building filter", e))?;
    filter.try_into().map_err(|e| seccomp_err("compiling filter", e))
}

/// Compiles and loads the filter into the calling thread.
///
/// Loading also sets `no_new_privs`, so set-id binaries cannot regain
/// what the bounding set and this filter took away.
///
/// # Errors
///
/// Returns an error if compilation or the `seccomp(2)` call fails. Nothing
/// is loaded when compilation fails.
pub fn install() -> Result<()> {
    for program in build_filter()? {
        seccompiler::apply_filter(&program).map_err(|e| seccomp_err("loading filter", e))?;
    }
    tracing::info!(
        conditional = arg_rules().count(),
        unconditional = DENIED_SYSCALLS.len(),
        fallback = FALLBACK_SYSCALLS.len(),
        "syscall filter loaded"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn filter_compiles_for_host_architecture() {
        let programs = build_filter().expect("filter should compile");
        assert_eq!(programs.len(), 2);
        assert!(programs.iter().all(|p| !p.is_empty()));
    }

    #[test]
    fn mode_rules_cover_both_set_id_bits() {
        for name in ["fchmod", "fchmodat"] {
            let masks: HashSet<u64> = arg_rules()
                .filter(|r| r.syscall == name)
                .map(|r| r.mask)
                .collect();
            assert_eq!(masks, HashSet::from([S_ISUID, S_ISGID]), "{name}");
        }
    }

    #[test]
    fn fchmodat_checks_the_mode_argument() {
        assert!(arg_rules().filter(|r| r.syscall == "fchmodat").all(|r| r.arg == 2));
        assert!(arg_rules().filter(|r| r.syscall == "fchmod").all(|r| r.arg == 1));
    }

    #[test]
    fn nested_user_namespaces_are_denied() {
        for name in ["unshare", "clone", "ioctl"] {
            let rule = arg_rules().find(|r| r.syscall == name).expect(name);
            assert_eq!(rule.arg, 0);
            assert_eq!(rule.mask, CLONE_NEWUSER);
            assert_eq!(rule.value, CLONE_NEWUSER);
        }
    }

    #[test]
    fn masked_rules_compare_against_the_mask() {
        assert!(arg_rules().all(|r| r.mask == r.value));
    }

    #[test]
    fn tables_do_not_overlap() {
        let conditional: HashSet<i64> = arg_rules().map(|r| r.nr).collect();
        for denial in DENIED_SYSCALLS {
            assert!(!conditional.contains(&denial.nr), "{}", denial.syscall);
        }
    }

    #[test]
    fn clone3_falls_back_to_the_inspectable_clone() {
        let clone3 = FALLBACK_SYSCALLS
            .iter()
            .find(|d| d.syscall == "clone3")
            .expect("clone3 listed");
        assert_eq!(clone3.nr, libc::SYS_clone3);
        assert!(arg_rules().all(|r| r.nr != libc::SYS_clone3));
        assert!(DENIED_SYSCALLS.iter().all(|d| d.nr != libc::SYS_clone3));
        assert!(arg_rules().any(|r| r.nr == libc::SYS_clone));
    }

    #[test]
    fn unconditional_list_is_complete() {
        let names: Vec<&str> = DENIED_SYSCALLS.iter().map(|d| d.syscall).collect();
        for expected in [
            "keyctl",
            "add_key",
            "request_key",
            "ptrace",
            "mbind",
            "migrate_pages",
            "move_pages",
            "set_mempolicy",
            "userfaultfd",
            "perf_event_open",
            "chroot",
        ] {
            assert!(names.contains(&expected), "{expected} missing");
        }
    }
}
