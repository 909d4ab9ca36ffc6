//! CLI command implementations.

mod simulate;
mod watch;

pub use simulate::{run_simulate, simulate, Simulation};
pub use watch::{parse_viewer_command, run_watch, ViewerCommand};
