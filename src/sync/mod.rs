//! Server sync: submits reward events to the backend with bounded retry,
//! keeps the local optimistic ledger, and reconciles it against the
//! authoritative balance.
//!
//! Submissions run in the background and never block tick processing. An
//! event whose retries are exhausted is marked failed and left for the next
//! balance refresh to settle; nothing here is fatal to playback.

pub mod backend;
pub mod http;
pub mod ledger;
pub mod retry;

use crate::engine::{
    RewardEvent, RewardKey, RewardModifier, RewardSink, SessionOutcome, SessionSummary,
};
use crate::time::Clock;
use backend::{
    BackendError, CompletionReport, CurrentRates, RewardBackend, WatchReceipt, WatchRequest,
};
use chrono::Utc;
use ledger::{BalanceView, RewardLedger};
use parking_lot::Mutex;
use retry::Backoff;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

pub use backend::{CompletionAck, UserProfile};
pub use http::HttpBackend;
pub use ledger::SubmissionStatus;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The backend credited a reward.
    Confirmed { key: RewardKey, points_earned: u64 },
    /// Retries exhausted or rejected; settled by the next balance refresh.
    Failed {
        key: RewardKey,
        attempts: u32,
        reason: String,
    },
    BalanceReconciled(BalanceView),
    /// Balance fetch failed; the last known balance is still shown.
    BalanceStale(BalanceView),
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("reward {0} already submitted")]
    Duplicate(RewardKey),
    #[error("gave up after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: BackendError,
    },
    #[error("rejected by backend: {0}")]
    Rejected(#[source] BackendError),
}

impl SyncError {
    fn attempts(&self) -> u32 {
        match self {
            SyncError::Duplicate(_) => 0,
            SyncError::Exhausted { attempts, .. } => *attempts,
            SyncError::Rejected(_) => 1,
        }
    }
}

#[derive(Debug)]
enum SyncCommand {
    Reward(RewardEvent),
    Completed(SessionSummary),
    AdShown(String),
    AdLeft(String),
}

pub struct ServerSync<B: RewardBackend, C: Clock> {
    backend: Arc<B>,
    clock: C,
    backoff: Backoff,
    ledger: Arc<Mutex<RewardLedger>>,
    events: broadcast::Sender<SyncEvent>,
    instance: Uuid,
}

impl<B: RewardBackend, C: Clock> Clone for ServerSync<B, C> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            clock: self.clock.clone(),
            backoff: self.backoff,
            ledger: self.ledger.clone(),
            events: self.events.clone(),
            instance: self.instance,
        }
    }
}

impl<B: RewardBackend, C: Clock> ServerSync<B, C> {
    pub fn new(backend: Arc<B>, clock: C, backoff: Backoff) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            backend,
            clock,
            backoff,
            ledger: Arc::new(Mutex::new(RewardLedger::new())),
            events,
            instance: Uuid::new_v4(),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn balance(&self) -> BalanceView {
        self.ledger.lock().view()
    }

    pub fn status(&self, key: &RewardKey) -> Option<SubmissionStatus> {
        self.ledger.lock().status(key).cloned()
    }

    /// `"{instance}:{ad_id}:{epoch}:{interval}"`, unique per reward across restarts.
    pub fn idempotency_key(&self, event: &RewardEvent) -> String {
        format!("{}:{}", self.instance, event.key())
    }

    /// Spawn the background worker and return the sink the controller feeds.
    pub fn spawn(&self) -> (SyncHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SyncHandle {
            tx,
            ledger: self.ledger.clone(),
        };
        let worker = self.clone();
        let join = tokio::spawn(async move { worker.run(rx).await });
        (handle, join)
    }

    async fn run(self, mut rx: mpsc::UnboundedReceiver<SyncCommand>) {
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                cmd = rx.recv() => match cmd {
                    Some(cmd) => {
                        let sync = self.clone();
                        tasks.spawn(async move { sync.dispatch(cmd).await });
                    }
                    None => break,
                },
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }
        let in_flight = tasks.len();
        if in_flight > 0 {
            tracing::info!(in_flight, "draining reward submissions");
        }
        while tasks.join_next().await.is_some() {}
    }

    async fn dispatch(&self, cmd: SyncCommand) {
        match cmd {
            SyncCommand::Reward(event) => {
                // Outcome is already in the ledger and on the event stream.
                let _ = self.deliver(&event).await;
            }
            SyncCommand::Completed(summary) => self.report_completion(&summary).await,
            SyncCommand::AdShown(ad_id) => {
                if let Err(err) = self.backend.ad_view_started(&ad_id).await {
                    tracing::debug!(%ad_id, "ad-view start not recorded: {err}");
                }
            }
            SyncCommand::AdLeft(ad_id) => {
                if let Err(err) = self.backend.ad_view_ended(&ad_id).await {
                    tracing::debug!(%ad_id, "ad-view end not recorded: {err}");
                }
            }
        }
    }

    /// Record and submit `event`, then refresh the balance.
    pub async fn submit(&self, event: RewardEvent) -> Result<WatchReceipt, SyncError> {
        if !self.ledger.lock().record(event.clone()) {
            return Err(SyncError::Duplicate(event.key()));
        }
        self.deliver(&event).await
    }

    /// Submit an event already tracked by the ledger.
    async fn deliver(&self, event: &RewardEvent) -> Result<WatchReceipt, SyncError> {
        let key = event.key();
        let request = WatchRequest {
            ad_id: event.ad_id.clone(),
            watch_time: event.credited_seconds,
            session_watch_time: event.watch_time,
            idempotency_key: self.idempotency_key(event),
        };
        let result = self
            .with_retry("record_watch", || self.backend.record_watch(&request))
            .await;
        match &result {
            Ok(receipt) => {
                self.ledger.lock().confirm(&key, receipt.points_earned);
                tracing::info!(%key, points = receipt.points_earned, "reward confirmed");
                let _ = self.events.send(SyncEvent::Confirmed {
                    key: key.clone(),
                    points_earned: receipt.points_earned,
                });
            }
            Err(err) => {
                let attempts = err.attempts();
                let reason = err.to_string();
                self.ledger.lock().fail(&key, attempts, reason.clone());
                tracing::warn!(
                    %key,
                    attempts,
                    "reward not confirmed, deferring to balance refresh: {reason}"
                );
                let _ = self.events.send(SyncEvent::Failed {
                    key: key.clone(),
                    attempts,
                    reason,
                });
            }
        }
        self.refresh_balance().await;
        result
    }

    async fn with_retry<T, F, Fut>(&self, label: &'static str, mut op: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(SyncError::Rejected(err)),
                Err(err) => match self.backoff.delay_after(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            op = label,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "backend call failed, retrying: {err}"
                        );
                        self.clock.sleep(delay).await;
                    }
                    None => {
                        return Err(SyncError::Exhausted {
                            attempts: attempt,
                            source: err,
                        })
                    }
                },
            }
        }
    }

    /// Fetch the authoritative balance and replace the local view with it.
    /// On failure the last known balance is kept and flagged stale.
    pub async fn refresh_balance(&self) -> BalanceView {
        let marker = self.ledger.lock().refresh_marker();
        match self.backend.fetch_profile().await {
            Ok(profile) => {
                let view = self.ledger.lock().reconcile(profile.points, marker);
                tracing::debug!(
                    authoritative = profile.points,
                    displayed = view.displayed,
                    "balance reconciled"
                );
                let _ = self.events.send(SyncEvent::BalanceReconciled(view));
                view
            }
            Err(err) => {
                let view = self.ledger.lock().mark_stale();
                tracing::warn!("balance refresh failed, keeping last known: {err}");
                let _ = self.events.send(SyncEvent::BalanceStale(view));
                view
            }
        }
    }

    /// Acknowledge a completed session. Not reward-bearing.
    pub async fn report_completion(&self, summary: &SessionSummary) {
        if summary.outcome != SessionOutcome::Completed {
            return;
        }
        let report = CompletionReport {
            ad_type: "video".into(),
            ad_id: summary.ad_id.clone(),
            completed: true,
            watch_duration: summary.watched_seconds,
            points_earned: summary.points_earned,
        };
        match self
            .with_retry("complete_ad", || self.backend.complete_ad(&report))
            .await
        {
            Ok(_) => tracing::debug!(ad_id = %summary.ad_id, "completion acknowledged"),
            Err(err) => {
                tracing::warn!(ad_id = %summary.ad_id, "completion not acknowledged: {err}");
            }
        }
    }

    pub async fn heartbeat(&self) {
        if let Err(err) = self.backend.heartbeat().await {
            tracing::debug!("heartbeat failed: {err}");
        }
    }

    /// Current server-side promotion modifier, or `None` if it cannot be fetched.
    pub async fn fetch_modifier(&self, base: RewardModifier) -> Option<RewardModifier> {
        match self.backend.current_rates().await {
            Ok(rates) => Some(modifier_from_rates(base, &rates)),
            Err(err) => {
                tracing::warn!("rates refresh failed, keeping current modifier: {err}");
                None
            }
        }
    }
}

/// Fold the server's active promotions onto `base`, skipping ones already ended.
pub fn modifier_from_rates(base: RewardModifier, rates: &CurrentRates) -> RewardModifier {
    let now = Utc::now();
    rates
        .active_promotions
        .iter()
        .filter(|promo| promo.ends_at.map_or(true, |end| end >= now))
        .filter(|promo| promo.multiplier.is_finite() && promo.multiplier > 0.0)
        .fold(base, |acc, promo| {
            RewardModifier::new(
                acc.multiplier * promo.multiplier,
                acc.bonus_points.saturating_add(promo.bonus),
            )
        })
}

/// Non-blocking sink handed to the controller; forwards to the sync worker.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<SyncCommand>,
    ledger: Arc<Mutex<RewardLedger>>,
}

impl SyncHandle {
    pub fn balance(&self) -> BalanceView {
        self.ledger.lock().view()
    }

    fn send(&self, cmd: SyncCommand) {
        if self.tx.send(cmd).is_err() {
            tracing::warn!("sync worker stopped; command dropped");
        }
    }
}

impl RewardSink for SyncHandle {
    fn reward(&self, event: RewardEvent) {
        // Optimistic display updates before the submission leaves.
        if !self.ledger.lock().record(event.clone()) {
            tracing::debug!(key = %event.key(), "duplicate reward ignored");
            return;
        }
        self.send(SyncCommand::Reward(event));
    }

    fn session_finished(&self, summary: &SessionSummary) {
        if summary.outcome == SessionOutcome::Completed {
            self.send(SyncCommand::Completed(summary.clone()));
        }
    }

    fn ad_shown(&self, ad_id: &str) {
        self.send(SyncCommand::AdShown(ad_id.to_string()));
    }

    fn ad_left(&self, ad_id: &str) {
        self.send(SyncCommand::AdLeft(ad_id.to_string()));
    }
}
