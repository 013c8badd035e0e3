//! `burrow run`: launch an instance and supervise it to completion.

use std::process::ExitCode;

use burrow_common::error::BurrowError;
use burrow_common::types::{InstanceName, ResourceLimits, VolumeMount};
use burrow_runtime::engine::{Engine, RunOptions};
use clap::Args;

/// Arguments for the `run` command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Instance to launch.
    pub name: String,

    /// Command and arguments to run inside the box (default: `sh`).
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// CPU bandwidth in fractional cores, e.g. `0.5`.
    #[arg(long)]
    pub cpus: Option<f64>,

    /// Memory limit, e.g. `128MiB` or `1GB`.
    #[arg(long, value_parser = parse_memory)]
    pub memory: Option<u64>,

    /// Maximum number of processes.
    #[arg(long)]
    pub max_pids: Option<u64>,

    /// Bind-mount a host directory, formatted `host:box`. Repeatable.
    #[arg(short = 'v', long = "volume", value_parser = parse_volume)]
    pub volumes: Vec<VolumeMount>,

    /// Do not attach user-mode networking.
    #[arg(long)]
    pub no_network: bool,
}

impl RunArgs {
    fn limits(&self) -> ResourceLimits {
        ResourceLimits {
            max_cpus: self.cpus,
            max_memory_bytes: self.memory,
            max_processes: self.max_pids,
        }
    }
}

/// Executes the `run` command.
///
/// A nonzero exit of the boxed command becomes this process's exit code
/// rather than an error. A failed bootstrap inside the box is an error.
///
/// # Errors
///
/// Returns an error if the launch itself fails.
pub fn execute(engine: &Engine, args: RunArgs) -> anyhow::Result<ExitCode> {
    let name = InstanceName::new(args.name.as_str())?;
    let options = RunOptions {
        limits: args.limits(),
        network: !args.no_network,
        command: args.command,
        volumes: args.volumes,
        ..RunOptions::default()
    };

    match engine.run(&name, options) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => match e.command_exit_code() {
            Some(code) => {
                if matches!(e, BurrowError::ExitStatus { .. }) {
                    tracing::debug!(name = %name, code, "command failed");
                } else {
                    tracing::warn!(name = %name, error = %e, "command failed and cleanup did too");
                }
                Ok(ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX)))
            }
            None => Err(e.into()),
        },
    }
}

/// Parses memory strings like "128MiB", "256MB", "1GiB" into bytes.
#[allow(clippy::option_if_let_else)]
fn parse_memory(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (num_str, multiplier) = if let Some(n) = s.strip_suffix("GiB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("GB") {
        (n, 1_000_000_000)
    } else if let Some(n) = s.strip_suffix("MiB") {
        (n, 1024 * 1024)
    } else if let Some(n) = s.strip_suffix("MB") {
        (n, 1_000_000)
    } else if let Some(n) = s.strip_suffix("KiB") {
        (n, 1024)
    } else if let Some(n) = s.strip_suffix("KB") {
        (n, 1000)
    } else {
        (s, 1)
    };
    num_str
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| format!("invalid memory size: {s:?}"))
}

fn parse_volume(s: &str) -> Result<VolumeMount, String> {
    VolumeMount::parse(s).map_err(|e| e.to_string())
}
