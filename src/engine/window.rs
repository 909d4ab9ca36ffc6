use super::policy::WindowCap;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Rolling count of rewarded ad completions, used only to cap local emission.
///
/// A session enters the window when it completes having earned points;
/// abandoned sessions never count, whatever they were paid. While fewer than
/// `max_ads` completions fall inside `window`, the session in progress may
/// earn. An optional cooldown after each counted completion withholds points
/// from intervals crossed before it expires.
#[derive(Debug, Clone)]
pub struct RewardWindow {
    cap: WindowCap,
    entries: VecDeque<WindowEntry>,
    last_completed_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    session_epoch: u64,
    completed_at: Instant,
}

impl RewardWindow {
    pub fn new(cap: WindowCap) -> Self {
        Self {
            cap,
            entries: VecDeque::new(),
            last_completed_at: None,
        }
    }

    pub fn cap(&self) -> WindowCap {
        self.cap
    }

    /// Whether a reward for `session_epoch` may carry points at `now`.
    pub fn admits(&mut self, session_epoch: u64, now: Instant) -> bool {
        if self.cooldown_remaining(now).is_some() {
            return false;
        }
        self.evict(now);
        self.contains(session_epoch) || self.entries.len() < self.cap.max_ads as usize
    }

    /// Count a rewarded completion of `session_epoch`; repeated calls for one
    /// session are no-ops.
    pub fn record_completion(&mut self, session_epoch: u64, now: Instant) {
        self.evict(now);
        if !self.contains(session_epoch) {
            self.entries.push_back(WindowEntry {
                session_epoch,
                completed_at: now,
            });
            self.last_completed_at = Some(now);
        }
    }

    /// Rewarded completions still counted at `now`.
    pub fn len(&mut self, now: Instant) -> usize {
        self.evict(now);
        self.entries.len()
    }

    pub fn is_empty(&mut self, now: Instant) -> bool {
        self.len(now) == 0
    }

    pub fn remaining(&mut self, now: Instant) -> u32 {
        let used = u32::try_from(self.len(now)).unwrap_or(u32::MAX);
        self.cap.max_ads.saturating_sub(used)
    }

    /// Time left before the cooldown after the last counted completion ends.
    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        let cooldown = self.cap.cooldown?;
        let ends = self.last_completed_at? + cooldown;
        ends.checked_duration_since(now).filter(|left| !left.is_zero())
    }

    /// Time until the oldest entry rolls out, when the window is full.
    pub fn reopens_in(&mut self, now: Instant) -> Option<Duration> {
        if self.remaining(now) > 0 {
            return None;
        }
        self.entries
            .front()
            .map(|entry| (entry.completed_at + self.cap.window).saturating_duration_since(now))
    }

    fn contains(&self, session_epoch: u64) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.session_epoch == session_epoch)
    }

    fn evict(&mut self, now: Instant) {
        let window = self.cap.window;
        while let Some(front) = self.entries.front() {
            if now.saturating_duration_since(front.completed_at) >= window {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }
}
