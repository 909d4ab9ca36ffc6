//! Per-advertisement watch session.
//!
//! States: `Idle -> Active -> {Paused <-> Active} -> {Completed | Abandoned}`.
//! Watched time grows only while `Active`, one tick quantum at a time, and is
//! clamped to the countable duration; reaching it completes the session.

use crate::catalog::Advertisement;
use std::fmt;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchStatus {
    Idle,
    Active,
    Paused,
    Completed,
    Abandoned,
}

impl WatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchStatus::Idle => "idle",
            WatchStatus::Active => "active",
            WatchStatus::Paused => "paused",
            WatchStatus::Completed => "completed",
            WatchStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WatchStatus::Completed | WatchStatus::Abandoned)
    }
}

impl fmt::Display for WatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid transition {from} -> {to}")]
    InvalidTransition { from: WatchStatus, to: WatchStatus },
    #[error("session is {status}, not active")]
    NotActive { status: WatchStatus },
    #[error("reward interval {requested} does not advance past {last}")]
    RewardRegression { last: u64, requested: u64 },
    #[error("reward interval {requested} needs {required}s watched, only {elapsed}s elapsed")]
    RewardAhead {
        requested: u64,
        required: u64,
        elapsed: u64,
    },
}

/// Result of attributing one tick to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    pub elapsed_watched_seconds: u64,
    pub completed: bool,
}

#[derive(Debug, Clone)]
pub struct WatchSession {
    ad_id: String,
    session_epoch: u64,
    duration_seconds: u64,
    countable_seconds: u64,
    points_per_interval: u64,
    started_at: Option<Instant>,
    last_tick_at: Option<Instant>,
    elapsed_watched_seconds: u64,
    last_rewarded_interval_index: u64,
    points_earned: u64,
    rewards: u64,
    status: WatchStatus,
}

impl WatchSession {
    /// Idle session for `ad`; `countable_seconds` is the duration after any per-ad cap.
    pub fn new(ad: &Advertisement, session_epoch: u64, countable_seconds: u64) -> Self {
        Self {
            ad_id: ad.id.clone(),
            session_epoch,
            duration_seconds: ad.duration_seconds,
            countable_seconds: countable_seconds.min(ad.duration_seconds),
            points_per_interval: ad.points_per_interval,
            started_at: None,
            last_tick_at: None,
            elapsed_watched_seconds: 0,
            last_rewarded_interval_index: 0,
            points_earned: 0,
            rewards: 0,
            status: WatchStatus::Idle,
        }
    }

    pub fn ad_id(&self) -> &str {
        &self.ad_id
    }

    pub fn session_epoch(&self) -> u64 {
        self.session_epoch
    }

    pub fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }

    pub fn countable_seconds(&self) -> u64 {
        self.countable_seconds
    }

    pub fn points_per_interval(&self) -> u64 {
        self.points_per_interval
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// Instant of the last credited tick, or of activation if none yet.
    pub fn last_tick_at(&self) -> Option<Instant> {
        self.last_tick_at.or(self.started_at)
    }

    pub fn elapsed_watched_seconds(&self) -> u64 {
        self.elapsed_watched_seconds
    }

    pub fn last_rewarded_interval_index(&self) -> u64 {
        self.last_rewarded_interval_index
    }

    pub fn points_earned(&self) -> u64 {
        self.points_earned
    }

    pub fn rewards(&self) -> u64 {
        self.rewards
    }

    pub fn status(&self) -> WatchStatus {
        self.status
    }

    /// `Idle -> Active`. A zero-length countable duration completes immediately.
    pub fn start(&mut self, now: Instant) -> Result<WatchStatus, SessionError> {
        if self.status != WatchStatus::Idle {
            return Err(self.invalid(WatchStatus::Active));
        }
        self.started_at = Some(now);
        self.last_tick_at = None;
        self.elapsed_watched_seconds = 0;
        self.last_rewarded_interval_index = 0;
        self.status = if self.countable_seconds == 0 {
            WatchStatus::Completed
        } else {
            WatchStatus::Active
        };
        Ok(self.status)
    }

    pub fn pause(&mut self) -> Result<(), SessionError> {
        if self.status != WatchStatus::Active {
            return Err(self.invalid(WatchStatus::Paused));
        }
        self.status = WatchStatus::Paused;
        Ok(())
    }

    /// `Paused -> Active`; the paused span is never credited.
    pub fn resume(&mut self) -> Result<(), SessionError> {
        if self.status != WatchStatus::Paused {
            return Err(self.invalid(WatchStatus::Active));
        }
        self.status = WatchStatus::Active;
        Ok(())
    }

    /// Credit one tick quantum of watched time.
    pub fn advance(&mut self, quantum_seconds: u64, now: Instant) -> Result<Advance, SessionError> {
        if self.status != WatchStatus::Active {
            return Err(SessionError::NotActive {
                status: self.status,
            });
        }
        self.elapsed_watched_seconds = self
            .elapsed_watched_seconds
            .saturating_add(quantum_seconds)
            .min(self.countable_seconds);
        self.last_tick_at = Some(now);
        let completed = self.elapsed_watched_seconds >= self.countable_seconds;
        if completed {
            self.status = WatchStatus::Completed;
        }
        Ok(Advance {
            elapsed_watched_seconds: self.elapsed_watched_seconds,
            completed,
        })
    }

    /// Record a reward up to `interval_index`; refuses regressions and unearned intervals.
    pub fn record_reward(
        &mut self,
        interval_index: u64,
        seconds_per_point: u64,
        points: u64,
    ) -> Result<(), SessionError> {
        if interval_index <= self.last_rewarded_interval_index {
            return Err(SessionError::RewardRegression {
                last: self.last_rewarded_interval_index,
                requested: interval_index,
            });
        }
        let required = interval_index.saturating_mul(seconds_per_point);
        if required > self.elapsed_watched_seconds {
            return Err(SessionError::RewardAhead {
                requested: interval_index,
                required,
                elapsed: self.elapsed_watched_seconds,
            });
        }
        self.last_rewarded_interval_index = interval_index;
        self.points_earned = self.points_earned.saturating_add(points);
        if points > 0 {
            self.rewards += 1;
        }
        Ok(())
    }

    /// Any non-terminal state -> `Abandoned`. Returns false if already terminal.
    pub fn abandon(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = WatchStatus::Abandoned;
        true
    }

    fn invalid(&self, to: WatchStatus) -> SessionError {
        SessionError::InvalidTransition {
            from: self.status,
            to,
        }
    }
}
