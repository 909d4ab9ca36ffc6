//! adwatch - unified CLI entrypoint.
//!
//! Usage:
//!   adwatch watch --config config/adwatch.toml
//!   adwatch simulate --duration 125 --pause-at 45 --resume-after 30

use adwatch::cli::commands::{run_simulate, run_watch};
use adwatch::cli::{Cli, Commands};
use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Watch(args) => run_watch(args).await,
        Commands::Simulate(args) => run_simulate(args),
    }
}
