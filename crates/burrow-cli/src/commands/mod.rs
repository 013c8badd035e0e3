//! CLI command definitions and dispatch.

pub mod ps;
pub mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use burrow_common::config::BurrowConfig;
use burrow_runtime::engine::Engine;
use clap::{Parser, Subcommand};

/// Minimal single-host container launcher.
#[derive(Parser, Debug)]
#[command(name = "burrow", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// JSON configuration file.
    #[arg(long, global = true, env = "BURROW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory holding the instance store.
    #[arg(long, global = true, env = "BURROW_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Launch an instance and wait for it to exit.
    Run(run::RunArgs),
    /// List instances and whether they are running.
    Ps(ps::PsArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if configuration loading or the command fails.
pub fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = BurrowConfig::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    let engine = Engine::new(config)?;
    tracing::debug!(data_dir = %engine.config().data_dir.display(), "engine ready");

    match cli.command {
        Command::Run(args) => run::execute(&engine, args),
        Command::Ps(args) => ps::execute(&engine, &args).map(|()| ExitCode::SUCCESS),
    }
}
