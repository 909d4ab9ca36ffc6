//! Reward policy: pure mapping from watched time to point awards.
//!
//! Nothing here reads a clock or mutates state. The controller feeds in the
//! session bookkeeping, the modifier captured at computation time, and whether
//! the rolling window still admits the ad; the policy answers with the reward
//! that is due, if any.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Activity a promotion can apply to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Watching,
    Rewarded,
}

/// Time-bounded promotion: multiplies base points and adds a flat bonus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    pub name: String,
    #[serde(default = "default_promo_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub bonus_points: u64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default = "default_applies_to")]
    pub applies_to: Vec<Activity>,
    #[serde(default = "default_promo_active")]
    pub active: bool,
}

fn default_promo_multiplier() -> f64 {
    2.0
}

fn default_applies_to() -> Vec<Activity> {
    vec![Activity::Watching, Activity::Rewarded]
}

fn default_promo_active() -> bool {
    true
}

impl Promotion {
    pub fn is_live(&self, at: DateTime<Utc>, activity: Activity) -> bool {
        self.active
            && self.starts_at <= at
            && at <= self.ends_at
            && self.applies_to.contains(&activity)
    }
}

/// Multiplicative factor and additive bonus applied when a reward is computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardModifier {
    pub multiplier: f64,
    pub bonus_points: u64,
}

impl Default for RewardModifier {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl RewardModifier {
    pub const IDENTITY: Self = Self {
        multiplier: 1.0,
        bonus_points: 0,
    };

    pub fn new(multiplier: f64, bonus_points: u64) -> Self {
        Self {
            multiplier,
            bonus_points,
        }
    }

    /// Fold live promotions onto a base modifier: multipliers compose, bonuses add.
    pub fn with_promotions(
        self,
        promotions: &[Promotion],
        at: DateTime<Utc>,
        activity: Activity,
    ) -> Self {
        promotions
            .iter()
            .filter(|promo| promo.is_live(at, activity))
            .fold(self, |acc, promo| Self {
                multiplier: acc.multiplier * promo.multiplier,
                bonus_points: acc.bonus_points.saturating_add(promo.bonus_points),
            })
    }

    /// `floor(base * multiplier) + bonus`.
    pub fn apply(&self, base_points: u64) -> u64 {
        let scaled = (base_points as f64 * self.multiplier).floor();
        let scaled = if scaled.is_finite() && scaled > 0.0 {
            scaled as u64
        } else {
            0
        };
        scaled.saturating_add(self.bonus_points)
    }
}

/// Rolling-window cap on rewarded ad completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCap {
    pub max_ads: u32,
    pub window: Duration,
    /// Minimum gap after a rewarded completion before points are paid again.
    pub cooldown: Option<Duration>,
}

impl Default for WindowCap {
    fn default() -> Self {
        Self {
            max_ads: 5,
            window: Duration::from_secs(600),
            cooldown: None,
        }
    }
}

/// Interval configuration shared by every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardPolicy {
    pub seconds_per_point: u64,
    pub min_watch_seconds: u64,
    pub max_countable_seconds_per_ad: Option<u64>,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            seconds_per_point: 60,
            min_watch_seconds: 30,
            max_countable_seconds_per_ad: None,
        }
    }
}

/// Session bookkeeping the policy needs to decide whether a reward is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardInput {
    pub elapsed_watched_seconds: u64,
    pub duration_seconds: u64,
    pub last_rewarded_interval_index: u64,
    pub points_per_interval: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardDue {
    /// Interval index the session reaches once this reward is recorded.
    pub interval_index: u64,
    /// Number of whole intervals covered by this reward.
    pub intervals: u64,
    pub base_points: u64,
    pub points: u64,
    /// The rolling window was full; the intervals are consumed for zero points.
    pub capped: bool,
}

impl RewardPolicy {
    /// Seconds of an ad that can count toward rewards.
    pub fn countable_seconds(&self, duration_seconds: u64) -> u64 {
        match self.max_countable_seconds_per_ad {
            Some(cap) => duration_seconds.min(cap),
            None => duration_seconds,
        }
    }

    /// `floor(min(elapsed, countable) / seconds_per_point)`.
    pub fn interval_index(&self, elapsed_watched_seconds: u64, duration_seconds: u64) -> u64 {
        if self.seconds_per_point == 0 {
            return 0;
        }
        elapsed_watched_seconds.min(self.countable_seconds(duration_seconds))
            / self.seconds_per_point
    }

    pub fn evaluate(
        &self,
        input: &RewardInput,
        modifier: &RewardModifier,
        window_open: bool,
    ) -> Option<RewardDue> {
        if input.elapsed_watched_seconds < self.min_watch_seconds {
            return None;
        }
        let index = self.interval_index(input.elapsed_watched_seconds, input.duration_seconds);
        if index <= input.last_rewarded_interval_index {
            return None;
        }
        let intervals = index - input.last_rewarded_interval_index;
        let base_points = intervals.saturating_mul(input.points_per_interval);
        let (points, capped) = if window_open {
            (modifier.apply(base_points), false)
        } else {
            (0, true)
        };
        Some(RewardDue {
            interval_index: index,
            intervals,
            base_points,
            points,
            capped,
        })
    }
}
