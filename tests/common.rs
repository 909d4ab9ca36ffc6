//! Common test harness utilities for integration tests.
//!
//! - [`FakeBackend`]: scriptable in-memory rewards backend
//! - [`RecordingSink`]: captures everything the controller emits
//! - helpers for driving a controller on a manual clock

// Not all test files use all helpers; silence dead_code warnings for unused exports.
#![allow(dead_code)]

use adwatch::catalog::{Advertisement, Catalog};
use adwatch::engine::{
    ControllerSettings, RewardEvent, RewardSink, SessionController, SessionSummary,
};
use adwatch::sync::backend::{
    BackendError, CompletionAck, CompletionReport, CurrentRates, RewardBackend, UserProfile,
    WatchReceipt, WatchRequest,
};
use adwatch::time::ManualClock;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// In-memory backend. `record_watch` credits `points_per_watch` once per
/// idempotency key, like the real ledger.
#[derive(Default)]
pub struct FakeBackend {
    pub ads: Mutex<Vec<Advertisement>>,
    pub balance: Mutex<u64>,
    pub points_per_watch: Mutex<u64>,
    pub rates: Mutex<CurrentRates>,
    watch_failures: Mutex<VecDeque<BackendError>>,
    profile_failures: Mutex<u32>,
    lost_responses: Mutex<u32>,
    pub watch_calls: Mutex<Vec<WatchRequest>>,
    pub completions: Mutex<Vec<CompletionReport>>,
    pub presence: Mutex<Vec<String>>,
    pub heartbeats: Mutex<u32>,
    credited_keys: Mutex<HashSet<String>>,
}

impl FakeBackend {
    pub fn new(balance: u64) -> Arc<Self> {
        let backend = Self::default();
        *backend.balance.lock() = balance;
        *backend.points_per_watch.lock() = 1;
        Arc::new(backend)
    }

    pub fn with_ads(balance: u64, ads: Vec<Advertisement>) -> Arc<Self> {
        let backend = Self::new(balance);
        *backend.ads.lock() = ads;
        backend
    }

    /// Fail the next `record_watch` calls with these errors, in order.
    pub fn fail_watches(&self, errors: impl IntoIterator<Item = BackendError>) {
        self.watch_failures.lock().extend(errors);
    }

    /// Credit the next `times` watches but report a transport error, as if
    /// the response never made it back.
    pub fn lose_responses(&self, times: u32) {
        *self.lost_responses.lock() = times;
    }

    pub fn fail_profile(&self, times: u32) {
        *self.profile_failures.lock() = times;
    }

    pub fn balance(&self) -> u64 {
        *self.balance.lock()
    }

    pub fn watch_call_count(&self) -> usize {
        self.watch_calls.lock().len()
    }

    pub fn credited(&self) -> usize {
        self.credited_keys.lock().len()
    }
}

pub fn unavailable() -> BackendError {
    BackendError::status("POST /api/ads/watch", 503, "unavailable")
}

pub fn rejected() -> BackendError {
    BackendError::status("POST /api/ads/watch", 400, "bad request")
}

#[async_trait]
impl RewardBackend for FakeBackend {
    async fn fetch_ads(&self) -> Result<Vec<Advertisement>, BackendError> {
        Ok(self.ads.lock().clone())
    }

    async fn record_watch(&self, request: &WatchRequest) -> Result<WatchReceipt, BackendError> {
        self.watch_calls.lock().push(request.clone());
        if let Some(err) = self.watch_failures.lock().pop_front() {
            return Err(err);
        }
        let points = *self.points_per_watch.lock();
        let mut balance = self.balance.lock();
        if self
            .credited_keys
            .lock()
            .insert(request.idempotency_key.clone())
        {
            *balance += points;
        }
        {
            let mut lost = self.lost_responses.lock();
            if *lost > 0 {
                *lost -= 1;
                return Err(BackendError::transport("POST /api/ads/watch", "connection reset"));
            }
        }
        Ok(WatchReceipt {
            points_earned: points,
            total_points: Some(*balance),
        })
    }

    async fn complete_ad(&self, report: &CompletionReport) -> Result<CompletionAck, BackendError> {
        self.completions.lock().push(report.clone());
        Ok(CompletionAck {
            success: true,
            message: None,
        })
    }

    async fn fetch_profile(&self) -> Result<UserProfile, BackendError> {
        {
            let mut failures = self.profile_failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(BackendError::transport("GET /api/auth/me", "connection refused"));
            }
        }
        Ok(UserProfile {
            id: "user-1".into(),
            name: "Viewer".into(),
            points: *self.balance.lock(),
            total_earned: 0,
        })
    }

    async fn current_rates(&self) -> Result<CurrentRates, BackendError> {
        Ok(self.rates.lock().clone())
    }

    async fn heartbeat(&self) -> Result<(), BackendError> {
        *self.heartbeats.lock() += 1;
        Ok(())
    }

    async fn ad_view_started(&self, ad_id: &str) -> Result<(), BackendError> {
        self.presence.lock().push(format!("shown:{ad_id}"));
        Ok(())
    }

    async fn ad_view_ended(&self, ad_id: &str) -> Result<(), BackendError> {
        self.presence.lock().push(format!("left:{ad_id}"));
        Ok(())
    }
}

/// Sink that records everything the controller emits.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<RewardEvent>>,
    pub summaries: Mutex<Vec<SessionSummary>>,
    pub presence: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<RewardEvent> {
        self.events.lock().clone()
    }

    pub fn total_points(&self) -> u64 {
        self.events.lock().iter().map(|event| event.points).sum()
    }

    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.summaries.lock().clone()
    }
}

impl RewardSink for RecordingSink {
    fn reward(&self, event: RewardEvent) {
        self.events.lock().push(event);
    }

    fn session_finished(&self, summary: &SessionSummary) {
        self.summaries.lock().push(summary.clone());
    }

    fn ad_shown(&self, ad_id: &str) {
        self.presence.lock().push(format!("shown:{ad_id}"));
    }

    fn ad_left(&self, ad_id: &str) {
        self.presence.lock().push(format!("left:{ad_id}"));
    }
}

pub type TestController = SessionController<ManualClock, Arc<RecordingSink>>;

pub fn ad(id: &str, duration_seconds: u64) -> Advertisement {
    Advertisement::new(id, duration_seconds, 1)
}

pub fn controller(
    ads: Vec<Advertisement>,
    settings: ControllerSettings,
) -> (ManualClock, TestController, Arc<RecordingSink>) {
    let clock = ManualClock::new();
    let sink = Arc::new(RecordingSink::default());
    let ctl = SessionController::new(clock.clone(), sink.clone(), settings)
        .with_catalog(Catalog::new(ads));
    (clock, ctl, sink)
}

/// Advance one second and tick, `secs` times.
pub fn watch(clock: &ManualClock, ctl: &mut TestController, secs: u64) {
    for _ in 0..secs {
        clock.advance(Duration::from_secs(1));
        ctl.tick();
    }
}
