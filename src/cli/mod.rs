//! adwatch CLI - unified command-line interface.
//!
//! - `adwatch watch` - Watch ads against a live backend
//! - `adwatch simulate` - Offline reward accrual on a manual clock

mod args;
pub mod commands;

pub use args::{Cli, Commands, OutputFormat, SimulateArgs, WatchArgs};
