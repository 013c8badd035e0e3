//! # burrow
//!
//! Minimal single-host container launcher.
//! The same binary is both the front end and the box bootstrap: a process
//! started with `BURROW_EXEC` set finishes isolating itself and `exec`s the
//! requested command instead of parsing a command line.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

#[cfg(not(target_os = "linux"))]
compile_error!("burrow relies on Linux namespaces and only builds for Linux");

mod commands;
mod output;

use std::process::ExitCode;

use burrow_common::constants::BOOTSTRAP_FAILURE_EXIT_CODE;
use burrow_runtime::bootstrap;
use clap::Parser;

use crate::commands::Cli;

fn main() -> ExitCode {
    let box_name = bootstrap::requested_instance();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Some(name) = box_name {
        let args = std::env::args_os().skip(1).collect();
        let Err(e) = bootstrap::boot(&name, args);
        eprintln!("burrow: {e}");
        return ExitCode::from(u8::try_from(BOOTSTRAP_FAILURE_EXIT_CODE).unwrap_or(u8::MAX));
    }

    let cli = Cli::parse();
    match commands::execute(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
