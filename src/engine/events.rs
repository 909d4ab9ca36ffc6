use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one reward: at most one event exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RewardKey {
    pub ad_id: String,
    pub session_epoch: u64,
    pub interval_index: u64,
}

impl fmt::Display for RewardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.ad_id, self.session_epoch, self.interval_index)
    }
}

/// Reward emitted by the controller for crossed intervals. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEvent {
    pub ad_id: String,
    pub session_epoch: u64,
    pub session_interval_index: u64,
    /// Whole intervals this event pays for (more than one only if ticks were coalesced).
    pub intervals: u64,
    /// Watched seconds at the interval boundary.
    pub watch_time: u64,
    /// Watched seconds this event pays for: `intervals * seconds_per_point`.
    pub credited_seconds: u64,
    pub points: u64,
    pub emitted_at: DateTime<Utc>,
}

impl RewardEvent {
    pub fn key(&self) -> RewardKey {
        RewardKey {
            ad_id: self.ad_id.clone(),
            session_epoch: self.session_epoch,
            interval_index: self.session_interval_index,
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Completed,
    Abandoned,
}

/// Summary of a finished session, reported for completions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub ad_id: String,
    pub session_epoch: u64,
    pub outcome: SessionOutcome,
    pub watched_seconds: u64,
    pub points_earned: u64,
    pub rewards: u64,
}
