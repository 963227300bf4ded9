use anyhow::Result;
use clap::Parser;

mod bootstrap;
mod commands;
mod output;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is the normal case outside local development.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => commands::serve::run(&cli.global, args).await,
        Commands::Worker => commands::worker::run(&cli.global, false).await,
        Commands::LegacyWorker => commands::worker::run(&cli.global, true).await,
        Commands::Check(args) => commands::check::run(&cli.global, args).await,
        Commands::Ingest(args) => commands::ingest::run(&cli.global, args).await,
        Commands::Dlq(args) => commands::dlq::run(&cli.global, args).await
    }
}
