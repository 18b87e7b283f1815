use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ledgermirror")]
#[command(about = "Mirror on-chain project registry events into a queryable store", long_about = None)]
pub struct Cli {
    /// Configuration file (default: $LEDGERMIRROR_CONFIG or config/ledgermirror.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync the mirror and serve the read API until Ctrl+C / SIGTERM
    Run,
    /// Clear the mirror, resync from the configured start block, then exit
    Rebuild,
    /// Print the persisted checkpoint and store statistics
    Status(StatusArgs),
    /// Print the mirrored record of one project owner
    Project(ProjectArgs),
}

#[derive(clap::Args, Debug)]
pub struct StatusArgs {
    /// Also list every owner with a record
    #[arg(long)]
    pub owners: bool,
}

#[derive(clap::Args, Debug)]
pub struct ProjectArgs {
    /// Owner address (0x-prefixed, 40 hex digits)
    pub owner: String,
}
