//! reqwest-backed [`RewardBackend`] speaking the rewards REST API.

use super::backend::{
    BackendError, CompletionAck, CompletionReport, CurrentRates, RewardBackend, UserProfile,
    WatchReceipt, WatchRequest,
};
use crate::catalog::Advertisement;
use crate::config::BackendConfig;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// `GET /api/auth/me` wraps the profile in `{"user": {...}}`; accept both shapes.
#[derive(Deserialize)]
#[serde(untagged)]
enum ProfileEnvelope {
    Wrapped { user: UserProfile },
    Bare(UserProfile),
}

#[derive(Clone)]
pub struct HttpBackend {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl HttpBackend {
    pub fn from_config(cfg: &BackendConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!("failed to build backend client: {err:?}");
                reqwest::Client::new()
            });
        Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `/api/{path}/{segment}` with `segment` percent-encoded as one path segment.
    fn url_with_segment(
        &self,
        endpoint: &'static str,
        path: &str,
        segment: &str,
    ) -> Result<Url, BackendError> {
        let mut url =
            Url::parse(&self.url(path)).map_err(|err| BackendError::invalid_url(endpoint, err))?;
        url.path_segments_mut()
            .map_err(|()| BackendError::invalid_url(endpoint, "base URL cannot carry a path"))?
            .pop_if_empty()
            .push(segment);
        Ok(url)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.authorize(self.http.request(method, self.url(path)))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(
        &self,
        endpoint: &'static str,
        builder: RequestBuilder,
    ) -> Result<Response, BackendError> {
        let response = builder
            .send()
            .await
            .map_err(|err| BackendError::transport(endpoint, err))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::status(endpoint, status.as_u16(), body));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        builder: RequestBuilder,
    ) -> Result<T, BackendError> {
        let response = self.send(endpoint, builder).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| BackendError::decode(endpoint, err))
    }
}

#[async_trait]
impl RewardBackend for HttpBackend {
    async fn fetch_ads(&self) -> Result<Vec<Advertisement>, BackendError> {
        self.send_json("GET /api/ads", self.request(Method::GET, "ads"))
            .await
    }

    async fn record_watch(&self, request: &WatchRequest) -> Result<WatchReceipt, BackendError> {
        let builder = self
            .request(Method::POST, "ads/watch")
            .header(IDEMPOTENCY_HEADER, request.idempotency_key.as_str())
            .json(request);
        self.send_json("POST /api/ads/watch", builder).await
    }

    async fn complete_ad(&self, report: &CompletionReport) -> Result<CompletionAck, BackendError> {
        let builder = self
            .request(Method::POST, "rewarded-ads/complete")
            .json(report);
        self.send_json("POST /api/rewarded-ads/complete", builder)
            .await
    }

    async fn fetch_profile(&self) -> Result<UserProfile, BackendError> {
        let envelope: ProfileEnvelope = self
            .send_json("GET /api/auth/me", self.request(Method::GET, "auth/me"))
            .await?;
        Ok(match envelope {
            ProfileEnvelope::Wrapped { user } => user,
            ProfileEnvelope::Bare(user) => user,
        })
    }

    async fn current_rates(&self) -> Result<CurrentRates, BackendError> {
        self.send_json(
            "GET /api/points-settings/current",
            self.request(Method::GET, "points-settings/current"),
        )
        .await
    }

    async fn heartbeat(&self) -> Result<(), BackendError> {
        self.send(
            "POST /api/activity/heartbeat",
            self.request(Method::POST, "activity/heartbeat"),
        )
        .await
        .map(|_| ())
    }

    async fn ad_view_started(&self, ad_id: &str) -> Result<(), BackendError> {
        const ENDPOINT: &str = "POST /api/activity/ad-view";
        let url = self.url_with_segment(ENDPOINT, "activity/ad-view", ad_id)?;
        let builder = self.authorize(self.http.request(Method::POST, url));
        self.send(ENDPOINT, builder).await.map(|_| ())
    }

    async fn ad_view_ended(&self, ad_id: &str) -> Result<(), BackendError> {
        const ENDPOINT: &str = "DELETE /api/activity/ad-view";
        let url = self.url_with_segment(ENDPOINT, "activity/ad-view", ad_id)?;
        let builder = self.authorize(self.http.request(Method::DELETE, url));
        self.send(ENDPOINT, builder).await.map(|_| ())
    }
}
