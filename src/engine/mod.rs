//! Reward session engine.
//!
//! - `session` - per-ad watch state machine
//! - `policy` - pure reward computation, promotions
//! - `window` - rolling cap on rewarded ads
//! - `events` - reward events and session summaries
//! - `controller` - single-session orchestration and tick attribution

pub mod controller;
pub mod events;
pub mod policy;
pub mod session;
pub mod window;

pub use controller::{
    ControllerSettings, Navigation, RewardSink, SessionController, TickOutcome, TICK_QUANTUM,
};
pub use events::{RewardEvent, RewardKey, SessionOutcome, SessionSummary};
pub use policy::{
    Activity, Promotion, RewardDue, RewardInput, RewardModifier, RewardPolicy, WindowCap,
};
pub use session::{SessionError, WatchSession, WatchStatus};
pub use window::RewardWindow;
