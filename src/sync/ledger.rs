//! Local reward ledger: optimistic points for submitted rewards, layered over
//! the last authoritative balance reported by the backend.
//!
//! The displayed total is always `authoritative + points not yet reflected in
//! it`; it is recomputed, never incremented, so a missed or duplicated local
//! update disappears on the next balance refresh.

use crate::engine::{RewardEvent, RewardKey};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubmissionStatus {
    Unconfirmed,
    Confirmed { points_earned: u64 },
    Failed { attempts: u32, reason: String },
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    event: RewardEvent,
    status: SubmissionStatus,
    /// Settlement sequence number; `None` while still in flight.
    settled_seq: Option<u64>,
}

impl LedgerEntry {
    fn optimistic_points(&self) -> u64 {
        match &self.status {
            SubmissionStatus::Confirmed { points_earned } => *points_earned,
            _ => self.event.points,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BalanceView {
    pub authoritative: Option<u64>,
    pub displayed: u64,
    pub unconfirmed: usize,
    pub failed: usize,
    pub stale: bool,
}

#[derive(Debug, Default)]
pub struct RewardLedger {
    entries: BTreeMap<RewardKey, LedgerEntry>,
    authoritative: Option<u64>,
    settle_seq: u64,
    /// Marker of the newest balance adopted so far.
    applied_marker: Option<u64>,
    stale: bool,
    confirmed_total: u64,
    failed_total: u64,
}

impl RewardLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly emitted event. Returns false for a key already tracked.
    pub fn record(&mut self, event: RewardEvent) -> bool {
        let key = event.key();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(
            key,
            LedgerEntry {
                event,
                status: SubmissionStatus::Unconfirmed,
                settled_seq: None,
            },
        );
        true
    }

    pub fn contains(&self, key: &RewardKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn status(&self, key: &RewardKey) -> Option<&SubmissionStatus> {
        self.entries.get(key).map(|entry| &entry.status)
    }

    pub fn confirm(&mut self, key: &RewardKey, points_earned: u64) -> bool {
        let settled = self.settle(key, SubmissionStatus::Confirmed { points_earned });
        if settled {
            self.confirmed_total += 1;
        }
        settled
    }

    pub fn fail(&mut self, key: &RewardKey, attempts: u32, reason: impl Into<String>) -> bool {
        let status = SubmissionStatus::Failed {
            attempts,
            reason: reason.into(),
        };
        let settled = self.settle(key, status);
        if settled {
            self.failed_total += 1;
        }
        settled
    }

    fn settle(&mut self, key: &RewardKey, status: SubmissionStatus) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            return false;
        };
        if entry.settled_seq.is_some() {
            return false;
        }
        self.settle_seq += 1;
        entry.status = status;
        entry.settled_seq = Some(self.settle_seq);
        true
    }

    /// Marker to pass back to [`reconcile`](Self::reconcile) for a balance
    /// fetch started now: only entries settled before it can be reflected.
    pub fn refresh_marker(&self) -> u64 {
        self.settle_seq
    }

    /// Adopt an authoritative balance fetched after `marker` was taken.
    ///
    /// A balance whose fetch started before the one already adopted is older
    /// than it and is ignored.
    pub fn reconcile(&mut self, authoritative: u64, marker: u64) -> BalanceView {
        if self.applied_marker.is_some_and(|applied| marker < applied) {
            return self.view();
        }
        self.applied_marker = Some(marker);
        self.entries
            .retain(|_, entry| entry.settled_seq.map_or(true, |seq| seq > marker));
        self.authoritative = Some(authoritative);
        self.stale = false;
        self.view()
    }

    /// The last fetch failed; keep the last known balance and flag it.
    pub fn mark_stale(&mut self) -> BalanceView {
        self.stale = true;
        self.view()
    }

    pub fn view(&self) -> BalanceView {
        let pending: u64 = self
            .entries
            .values()
            .map(LedgerEntry::optimistic_points)
            .sum();
        BalanceView {
            authoritative: self.authoritative,
            displayed: self.authoritative.unwrap_or(0).saturating_add(pending),
            unconfirmed: self
                .entries
                .values()
                .filter(|entry| entry.status == SubmissionStatus::Unconfirmed)
                .count(),
            failed: self
                .entries
                .values()
                .filter(|entry| matches!(entry.status, SubmissionStatus::Failed { .. }))
                .count(),
            stale: self.stale,
        }
    }

    pub fn confirmed_total(&self) -> u64 {
        self.confirmed_total
    }

    pub fn failed_total(&self) -> u64 {
        self.failed_total
    }

    pub fn pending_events(&self) -> Vec<RewardEvent> {
        self.entries
            .values()
            .filter(|entry| entry.settled_seq.is_none())
            .map(|entry| entry.event.clone())
            .collect()
    }
}
