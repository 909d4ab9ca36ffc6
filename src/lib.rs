#![warn(unused, dead_code)]
#![deny(clippy::all, clippy::pedantic)]
// Module naming: common pattern in domain-driven code
#![allow(clippy::module_name_repetitions)]
// Function complexity: some functions are inherently complex
#![allow(clippy::too_many_lines)]
// Documentation style: many terms don't need backticks
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
// API ergonomics: prefer simplicity over must_use annotations
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
// Format strings: allow non-inlined for readability
#![allow(clippy::uninlined_format_args)]
// Import style
#![allow(clippy::wildcard_imports)]
// Numeric casts: points and seconds stay far below the lossy ranges
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
// Control flow style
#![allow(clippy::if_not_else)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::single_match_else)]
#![allow(clippy::manual_let_else)]
// Passing style
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::trivially_copy_pass_by_ref)]
// Option/Result patterns
#![allow(clippy::option_if_let_else)]
#![allow(clippy::map_unwrap_or)]
// Closure style
#![allow(clippy::redundant_closure_for_method_calls)]
// Explicit type bounds
#![allow(clippy::significant_drop_tightening)]
// Error handling style
#![allow(clippy::result_large_err)]
// Async functions that may not await yet
#![allow(clippy::unused_async)]
// Float comparisons on configured modifiers
#![allow(clippy::float_cmp)]

//! adwatch - ad-watch reward session engine.
//!
//! Accounts watched time per ad, decides when a reward is due, and reconciles
//! locally shown points with the backend's authoritative ledger.
//!
//! # Module Organization
//!
//! ## Core
//! - `core::config` - Configuration parsing and validation
//! - `core::runtime` - Tick, heartbeat, refresh and navigation driver
//! - `core::time` - Monotonic clock abstraction
//!
//! ## Catalog
//! - `catalog` - Advertisements and the navigation cursor
//!
//! ## Engine
//! - `engine::session` - Per-ad watch state machine
//! - `engine::policy` - Reward computation and promotions
//! - `engine::window` - Rolling cap on rewarded ads
//! - `engine::controller` - Single active session orchestration
//!
//! ## Sync
//! - `sync::backend` - Backend trait and wire types
//! - `sync::http` - reqwest backend
//! - `sync::ledger` - Optimistic and authoritative points
//! - `sync::retry` - Bounded exponential backoff
//!
//! ## Operations
//! - `ops::telemetry` - Logging setup

// Core infrastructure
pub mod core;

// Catalog
pub mod catalog;

// Engine
pub mod engine;

// Server sync
pub mod sync;

// Operations
pub mod ops;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, runtime, time};
pub use ops::telemetry;
