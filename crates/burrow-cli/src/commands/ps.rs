//! `burrow ps`: list instances with their re-derived state.

use burrow_common::types::InstanceState;
use burrow_runtime::engine::Engine;
use clap::Args;

use crate::output;

/// Arguments for the `ps` command.
#[derive(Args, Debug)]
pub struct PsArgs {
    /// Show all instances (including stopped).
    #[arg(short, long)]
    pub all: bool,

    /// Print JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `ps` command.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn execute(engine: &Engine, args: &PsArgs) -> anyhow::Result<()> {
    let statuses: Vec<_> = engine
        .list()?
        .into_iter()
        .filter(|s| args.all || s.state == InstanceState::Running)
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }
    if statuses.is_empty() {
        println!("No instances found.");
        return Ok(());
    }
    print!("{}", output::status_table(&statuses));
    Ok(())
}
