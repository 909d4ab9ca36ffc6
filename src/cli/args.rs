//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// adwatch - rewarded ad viewer and reward engine tools.
#[derive(Parser)]
#[command(name = "adwatch")]
#[command(version)]
#[command(about = "Watch rewarded ads against a rewards backend, or simulate rewards offline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch ads against a live backend; navigation is read from stdin
    Watch(WatchArgs),

    /// Replay one ad viewing on a manual clock and print the rewards it earns
    Simulate(SimulateArgs),
}

/// Output format for events written to stdout.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON objects, one per line
    #[default]
    Json,
    /// Human-readable lines
    Text,
}

// -----------------------------------------------------------------------------
// Watch command
// -----------------------------------------------------------------------------

#[derive(Args)]
pub struct WatchArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/adwatch.toml")]
    pub config: PathBuf,

    /// Override backend.base_url
    #[arg(long, value_name = "URL")]
    pub backend_url: Option<String>,

    /// Override backend.token
    #[arg(long)]
    pub token: Option<String>,

    /// Keep the catalog in server order
    #[arg(long)]
    pub no_shuffle: bool,

    /// Open the ad at this catalog index on startup
    #[arg(long, value_name = "INDEX")]
    pub open: Option<usize>,

    /// Output format for sync events
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
}

// -----------------------------------------------------------------------------
// Simulate command
// -----------------------------------------------------------------------------

#[derive(Args, Clone, Debug)]
pub struct SimulateArgs {
    /// Ad duration in seconds
    #[arg(long)]
    pub duration: u64,

    /// Watched seconds per reward interval
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub seconds_per_point: u64,

    /// Watched seconds required before any reward
    #[arg(long, default_value_t = 30)]
    pub min_watch: u64,

    /// Points per interval
    #[arg(long, default_value_t = 1)]
    pub points: u64,

    /// Reward multiplier
    #[arg(long, default_value_t = 1.0)]
    pub multiplier: f64,

    /// Pause once this many seconds have been watched
    #[arg(long, value_name = "SECONDS")]
    pub pause_at: Option<u64>,

    /// How long to stay paused (wall seconds) before resuming; never resumes if omitted
    #[arg(long, value_name = "SECONDS", requires = "pause_at")]
    pub resume_after: Option<u64>,

    /// Leave the ad once this many seconds have been watched
    #[arg(long, value_name = "SECONDS")]
    pub leave_at: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
}
