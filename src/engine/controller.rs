//! Session controller: owns the single active watch session, attributes ticks
//! to it, consults the reward policy, and hands reward events to a sink.
//!
//! Every navigation abandons the previous session synchronously before the
//! next one is activated, so two sessions are never active at once.

use super::events::{RewardEvent, SessionOutcome, SessionSummary};
use super::policy::{Activity, Promotion, RewardInput, RewardModifier, RewardPolicy, WindowCap};
use super::session::{WatchSession, WatchStatus};
use super::window::RewardWindow;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::time::Clock;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Watched time credited per accepted tick.
pub const TICK_QUANTUM: Duration = Duration::from_secs(1);
const TICK_QUANTUM_SECONDS: u64 = 1;

/// Receiver of everything the controller emits. Implementations must not block.
pub trait RewardSink: Send + Sync {
    fn reward(&self, event: RewardEvent);

    fn session_finished(&self, _summary: &SessionSummary) {}

    fn ad_shown(&self, _ad_id: &str) {}

    fn ad_left(&self, _ad_id: &str) {}
}

impl<T: RewardSink + ?Sized> RewardSink for Arc<T> {
    fn reward(&self, event: RewardEvent) {
        (**self).reward(event);
    }

    fn session_finished(&self, summary: &SessionSummary) {
        (**self).session_finished(summary);
    }

    fn ad_shown(&self, ad_id: &str) {
        (**self).ad_shown(ad_id);
    }

    fn ad_left(&self, ad_id: &str) {
        (**self).ad_left(ad_id);
    }
}

/// Navigation and playback requests, applied strictly in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Open(usize),
    Next,
    Previous,
    Pause,
    Resume,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    NoSession,
    Ignored { status: WatchStatus },
    TooEarly,
    Credited {
        elapsed_watched_seconds: u64,
        reward: Option<RewardEvent>,
        completed: bool,
    },
}

impl TickOutcome {
    pub fn reward(&self) -> Option<&RewardEvent> {
        match self {
            TickOutcome::Credited { reward, .. } => reward.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub policy: RewardPolicy,
    pub window: WindowCap,
    pub modifier: RewardModifier,
    pub promotions: Vec<Promotion>,
    pub tick_jitter: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            policy: RewardPolicy::default(),
            window: WindowCap::default(),
            modifier: RewardModifier::IDENTITY,
            promotions: Vec::new(),
            tick_jitter: Duration::from_millis(100),
        }
    }
}

impl ControllerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            policy: config.policy.reward_policy(),
            window: config.policy.window_cap(),
            modifier: RewardModifier::new(config.policy.multiplier, config.policy.bonus_points),
            promotions: config.policy.promotions.clone(),
            tick_jitter: Duration::from_millis(config.session.tick_jitter_ms),
        }
    }

    fn min_tick_spacing(&self) -> Duration {
        TICK_QUANTUM.saturating_sub(self.tick_jitter)
    }
}

pub struct SessionController<C: Clock, S: RewardSink> {
    clock: C,
    sink: S,
    settings: ControllerSettings,
    catalog: Catalog,
    active: Option<WatchSession>,
    window: RewardWindow,
    last_epoch: u64,
}

impl<C: Clock, S: RewardSink> SessionController<C, S> {
    pub fn new(clock: C, sink: S, settings: ControllerSettings) -> Self {
        let window = RewardWindow::new(settings.window);
        Self {
            clock,
            sink,
            settings,
            catalog: Catalog::default(),
            active: None,
            window,
            last_epoch: 0,
        }
    }

    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Replace the catalog; any active session is abandoned first.
    pub fn load_catalog(&mut self, catalog: Catalog) {
        self.finish_active();
        self.catalog = catalog;
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn active(&self) -> Option<&WatchSession> {
        self.active.as_ref()
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Install a new base modifier; it applies from the next computed reward on.
    pub fn set_modifier(&mut self, modifier: RewardModifier) {
        tracing::info!(
            multiplier = modifier.multiplier,
            bonus = modifier.bonus_points,
            "reward modifier updated"
        );
        self.settings.modifier = modifier;
    }

    /// Modifier in force right now, including live promotions.
    pub fn current_modifier(&self) -> RewardModifier {
        self.settings
            .modifier
            .with_promotions(&self.settings.promotions, Utc::now(), Activity::Watching)
    }

    pub fn window_remaining(&mut self) -> u32 {
        let now = self.clock.now();
        self.window.remaining(now)
    }

    pub fn cooldown_remaining(&self) -> Option<Duration> {
        self.window.cooldown_remaining(self.clock.now())
    }

    /// Apply one navigation request. Returns whether a new session was activated.
    pub fn navigate(&mut self, nav: Navigation) -> bool {
        let before = self.last_epoch;
        match nav {
            Navigation::Open(index) => {
                self.open(index);
            }
            Navigation::Next => {
                self.next();
            }
            Navigation::Previous => {
                self.previous();
            }
            Navigation::Pause => {
                self.pause();
            }
            Navigation::Resume => {
                self.resume();
            }
            Navigation::Close => self.close(),
        }
        self.last_epoch != before
    }

    /// Show the ad at `index`, starting a fresh session. Re-opening the
    /// current ad also starts over.
    pub fn open(&mut self, index: usize) -> bool {
        if index >= self.catalog.len() {
            tracing::debug!(index, len = self.catalog.len(), "open ignored: index out of range");
            return false;
        }
        self.activate(index);
        true
    }

    pub fn next(&mut self) -> bool {
        let target = self.catalog.position().map_or(0, |idx| idx + 1);
        if target >= self.catalog.len() {
            tracing::debug!("next ignored: already at last ad");
            return false;
        }
        self.activate(target);
        true
    }

    pub fn previous(&mut self) -> bool {
        match self.catalog.position() {
            Some(idx) if idx > 0 => {
                self.activate(idx - 1);
                true
            }
            _ => {
                tracing::debug!("previous ignored: already at first ad");
                false
            }
        }
    }

    pub fn pause(&mut self) -> bool {
        match self.active.as_mut().map(WatchSession::pause) {
            Some(Ok(())) => true,
            Some(Err(err)) => {
                tracing::debug!("pause ignored: {err}");
                false
            }
            None => false,
        }
    }

    pub fn resume(&mut self) -> bool {
        match self.active.as_mut().map(WatchSession::resume) {
            Some(Ok(())) => true,
            Some(Err(err)) => {
                tracing::debug!("resume ignored: {err}");
                false
            }
            None => false,
        }
    }

    /// Close the viewer: abandon the session and forget the cursor.
    pub fn close(&mut self) {
        self.finish_active();
        self.catalog.reset();
    }

    /// Attribute one tick to the active session.
    pub fn tick(&mut self) -> TickOutcome {
        let now = self.clock.now();
        let min_spacing = self.settings.min_tick_spacing();
        let Some(session) = self.active.as_mut() else {
            return TickOutcome::NoSession;
        };
        if session.status() != WatchStatus::Active {
            tracing::debug!(
                ad_id = session.ad_id(),
                status = %session.status(),
                "tick ignored for inactive session"
            );
            return TickOutcome::Ignored {
                status: session.status(),
            };
        }
        if let Some(last) = session.last_tick_at() {
            if now.saturating_duration_since(last) < min_spacing {
                tracing::debug!(ad_id = session.ad_id(), "tick ignored: arrived early");
                return TickOutcome::TooEarly;
            }
        }
        let step = match session.advance(TICK_QUANTUM_SECONDS, now) {
            Ok(step) => step,
            Err(err) => {
                tracing::debug!("tick ignored: {err}");
                return TickOutcome::Ignored {
                    status: session.status(),
                };
            }
        };
        let reward = self.settle_rewards();
        if step.completed {
            self.finish_active();
        }
        TickOutcome::Credited {
            elapsed_watched_seconds: step.elapsed_watched_seconds,
            reward,
            completed: step.completed,
        }
    }

    fn settle_rewards(&mut self) -> Option<RewardEvent> {
        let now = self.clock.now();
        let modifier = self.current_modifier();
        let policy = self.settings.policy;
        let session = self.active.as_mut()?;
        let epoch = session.session_epoch();
        let input = RewardInput {
            elapsed_watched_seconds: session.elapsed_watched_seconds(),
            duration_seconds: session.duration_seconds(),
            last_rewarded_interval_index: session.last_rewarded_interval_index(),
            points_per_interval: session.points_per_interval(),
        };
        let window_open = self.window.admits(epoch, now);
        let due = policy.evaluate(&input, &modifier, window_open)?;
        let recorded =
            session.record_reward(due.interval_index, policy.seconds_per_point, due.points);
        if let Err(err) = recorded {
            tracing::warn!(ad_id = session.ad_id(), "reward bookkeeping refused: {err}");
            return None;
        }
        if due.capped {
            tracing::info!(
                ad_id = session.ad_id(),
                interval = due.interval_index,
                "reward window closed; interval consumed without points"
            );
            return None;
        }
        if due.points == 0 {
            return None;
        }
        let event = RewardEvent {
            ad_id: session.ad_id().to_string(),
            session_epoch: epoch,
            session_interval_index: due.interval_index,
            intervals: due.intervals,
            watch_time: due.interval_index.saturating_mul(policy.seconds_per_point),
            credited_seconds: due.intervals.saturating_mul(policy.seconds_per_point),
            points: due.points,
            emitted_at: Utc::now(),
        };
        tracing::info!(
            ad_id = %event.ad_id,
            interval = event.session_interval_index,
            points = event.points,
            "reward emitted"
        );
        self.sink.reward(event.clone());
        Some(event)
    }

    fn activate(&mut self, index: usize) {
        self.finish_active();
        let Some(ad) = self.catalog.seek(index).cloned() else {
            return;
        };
        self.last_epoch += 1;
        let countable = self.settings.policy.countable_seconds(ad.duration_seconds);
        let mut session = WatchSession::new(&ad, self.last_epoch, countable);
        let now = self.clock.now();
        match session.start(now) {
            Ok(status) => {
                tracing::info!(
                    ad_id = %ad.id,
                    epoch = self.last_epoch,
                    countable_seconds = countable,
                    "watch session started"
                );
                self.sink.ad_shown(&ad.id);
                self.active = Some(session);
                if status == WatchStatus::Completed {
                    self.finish_active();
                }
            }
            Err(err) => tracing::warn!(ad_id = %ad.id, "session failed to start: {err}"),
        }
    }

    /// Discard the active session, abandoning it if it has not completed.
    fn finish_active(&mut self) -> Option<SessionSummary> {
        let mut session = self.active.take()?;
        session.abandon();
        let outcome = match session.status() {
            WatchStatus::Completed => SessionOutcome::Completed,
            _ => SessionOutcome::Abandoned,
        };
        let summary = SessionSummary {
            ad_id: session.ad_id().to_string(),
            session_epoch: session.session_epoch(),
            outcome,
            watched_seconds: session.elapsed_watched_seconds(),
            points_earned: session.points_earned(),
            rewards: session.rewards(),
        };
        if summary.outcome == SessionOutcome::Completed && summary.points_earned > 0 {
            let now = self.clock.now();
            self.window.record_completion(summary.session_epoch, now);
        }
        tracing::info!(
            ad_id = %summary.ad_id,
            epoch = summary.session_epoch,
            outcome = ?summary.outcome,
            watched_seconds = summary.watched_seconds,
            points = summary.points_earned,
            "watch session ended"
        );
        self.sink.ad_left(&summary.ad_id);
        self.sink.session_finished(&summary);
        Some(summary)
    }
}
