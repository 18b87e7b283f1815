mod cli;
mod service;

use clap::Parser;
use cli::{Cli, Commands};
use ledgermirror::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.command {
        Commands::Status(_) | Commands::Project(_) => Config::load_read_only(cli.config)?,
        Commands::Run | Commands::Rebuild => Config::load_with(cli.config)?,
    };

    match cli.command {
        Commands::Run => service::run(config).await?,
        Commands::Rebuild => service::rebuild(config).await?,
        Commands::Status(args) => service::status(config, args.owners)?,
        Commands::Project(args) => service::project(config, &args.owner)?,
    }

    Ok(())
}
