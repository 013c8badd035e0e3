//! # burrow-core
//!
//! Low-level Linux isolation primitives for the burrow launcher.
//!
//! This crate provides safe abstractions over:
//! - **Cgroups v2**: per-instance directories with PID, CPU and memory limits.
//! - **Namespaces**: the namespace set and uid/gid mapping of a box.
//! - **Filesystem**: device and volume bind mounts, `chroot`, `/proc` and `/tmp`.
//! - **Capabilities**: bounding-set reduction from a fixed deny-list.
//! - **Seccomp**: a declarative deny table compiled into one filter.
//! - **Network**: attachment of an external user-mode network helper.
//!
//! System calls go through `nix`, `caps` and `seccompiler`; this crate
//! contains no `unsafe` code of its own.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

#[cfg(target_os = "linux")]
pub mod capability;
pub mod cgroup;
#[cfg(target_os = "linux")]
pub mod filesystem;
#[cfg(target_os = "linux")]
pub mod namespace;
pub mod network;
#[cfg(target_os = "linux")]
pub mod seccomp;
