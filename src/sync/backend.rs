//! Backend collaborator: the REST API that owns the points ledger and the ad
//! catalog. The engine only talks to it through [`RewardBackend`].

use crate::catalog::Advertisement;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// `POST /api/ads/watch` body. The idempotency key travels as a header.
///
/// The server pays `watch_time / 60 * points_per_minute` per request, so
/// `watch_time` carries only the seconds this reward covers.
/// `session_watch_time` is the cumulative boundary within the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchRequest {
    pub ad_id: String,
    pub watch_time: u64,
    pub session_watch_time: u64,
    #[serde(skip)]
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchReceipt {
    pub points_earned: u64,
    #[serde(default)]
    pub total_points: Option<u64>,
}

/// `POST /api/rewarded-ads/complete` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionReport {
    pub ad_type: String,
    pub ad_id: String,
    pub completed: bool,
    pub watch_duration: u64,
    pub points_earned: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Authoritative user record from `GET /api/auth/me`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub points: u64,
    #[serde(default)]
    pub total_earned: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatePromotion {
    pub name: String,
    #[serde(default = "one")]
    pub multiplier: f64,
    #[serde(default)]
    pub bonus: u64,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
}

fn one() -> f64 {
    1.0
}

/// `GET /api/points-settings/current`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentRates {
    #[serde(default)]
    pub points_per_minute: Option<u64>,
    #[serde(default)]
    pub active_promotions: Vec<RatePromotion>,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request {endpoint} failed: {message}")]
    Transport {
        endpoint: Cow<'static, str>,
        message: String,
    },
    #[error("backend {endpoint} returned status {status}: {body}")]
    Status {
        endpoint: Cow<'static, str>,
        status: u16,
        body: String,
    },
    #[error("backend {endpoint} response could not be decoded: {message}")]
    Decode {
        endpoint: Cow<'static, str>,
        message: String,
    },
    #[error("backend {endpoint} URL is invalid: {message}")]
    InvalidUrl {
        endpoint: Cow<'static, str>,
        message: String,
    },
}

impl BackendError {
    pub fn transport(endpoint: impl Into<Cow<'static, str>>, message: impl ToString) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    pub fn status(
        endpoint: impl Into<Cow<'static, str>>,
        status: u16,
        body: impl Into<String>,
    ) -> Self {
        Self::Status {
            endpoint: endpoint.into(),
            status,
            body: body.into(),
        }
    }

    pub fn invalid_url(endpoint: impl Into<Cow<'static, str>>, message: impl ToString) -> Self {
        Self::InvalidUrl {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    pub fn decode(endpoint: impl Into<Cow<'static, str>>, message: impl ToString) -> Self {
        Self::Decode {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// Transport failures, throttling and server errors may succeed on retry;
    /// other client errors and undecodable bodies will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Transport { .. } => true,
            BackendError::Status { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            BackendError::Decode { .. } | BackendError::InvalidUrl { .. } => false,
        }
    }
}

#[async_trait]
pub trait RewardBackend: Send + Sync + 'static {
    async fn fetch_ads(&self) -> Result<Vec<Advertisement>, BackendError>;

    async fn record_watch(&self, request: &WatchRequest) -> Result<WatchReceipt, BackendError>;

    async fn complete_ad(&self, report: &CompletionReport) -> Result<CompletionAck, BackendError>;

    async fn fetch_profile(&self) -> Result<UserProfile, BackendError>;

    async fn current_rates(&self) -> Result<CurrentRates, BackendError>;

    async fn heartbeat(&self) -> Result<(), BackendError>;

    async fn ad_view_started(&self, ad_id: &str) -> Result<(), BackendError>;

    async fn ad_view_ended(&self, ad_id: &str) -> Result<(), BackendError>;
}
