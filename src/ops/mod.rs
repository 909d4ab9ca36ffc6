//! Operations: structured logging setup and runtime log-level control.

pub mod telemetry;

pub use telemetry::*;
