//! Launch orchestration for the burrow container launcher.
//!
//! The parent side ([`engine`]) and the child side ([`bootstrap`]) live in
//! the same binary; the child is told apart by an environment sentinel.

#![allow(unsafe_code)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

#[cfg(target_os = "linux")]
pub mod bootstrap;
#[cfg(target_os = "linux")]
pub mod engine;
#[cfg(target_os = "linux")]
pub mod process;
pub mod state;
pub mod volume;
