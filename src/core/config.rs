use crate::engine::policy::{Promotion, RewardPolicy, WindowCap};
use crate::sync::retry::Backoff;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/adwatch.toml";
const MAX_MULTIPLIER: f64 = 10.0;

/// Top-level configuration for the reward engine.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub backend: BackendConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the rewards API, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Bearer token for the signed-in user.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_seconds_per_point")]
    pub seconds_per_point: u64,
    /// Watched seconds below which no reward is ever due.
    #[serde(default = "default_min_watch_seconds")]
    pub min_watch_seconds: u64,
    /// Caps the countable seconds of any single ad, regardless of its duration.
    #[serde(default)]
    pub max_countable_seconds_per_ad: Option<u64>,
    #[serde(default = "default_max_ads_per_window")]
    pub max_ads_per_window: u32,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Seconds after a rewarded completion during which no points are paid.
    #[serde(default)]
    pub cooldown_seconds: Option<u64>,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub bonus_points: u64,
    #[serde(default)]
    pub promotions: Vec<Promotion>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            seconds_per_point: default_seconds_per_point(),
            min_watch_seconds: default_min_watch_seconds(),
            max_countable_seconds_per_ad: None,
            max_ads_per_window: default_max_ads_per_window(),
            window_seconds: default_window_seconds(),
            cooldown_seconds: None,
            multiplier: default_multiplier(),
            bonus_points: 0,
            promotions: Vec::new(),
        }
    }
}

impl PolicyConfig {
    pub fn reward_policy(&self) -> RewardPolicy {
        RewardPolicy {
            seconds_per_point: self.seconds_per_point,
            min_watch_seconds: self.min_watch_seconds,
            max_countable_seconds_per_ad: self.max_countable_seconds_per_ad,
        }
    }

    pub fn window_cap(&self) -> WindowCap {
        WindowCap {
            max_ads: self.max_ads_per_window,
            window: Duration::from_secs(self.window_seconds),
            cooldown: self
                .cooldown_seconds
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Ticks arriving earlier than `1s - tick_jitter_ms` after the last credited tick are ignored.
    #[serde(default = "default_tick_jitter_ms")]
    pub tick_jitter_ms: u64,
    #[serde(default = "default_heartbeat_seconds")]
    pub heartbeat_seconds: u64,
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_jitter_ms: default_tick_jitter_ms(),
            heartbeat_seconds: default_heartbeat_seconds(),
            shuffle: default_shuffle(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_balance_refresh_seconds")]
    pub balance_refresh_seconds: u64,
    #[serde(default = "default_rates_refresh_seconds")]
    pub rates_refresh_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            balance_refresh_seconds: default_balance_refresh_seconds(),
            rates_refresh_seconds: default_rates_refresh_seconds(),
        }
    }
}

impl SyncConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            self.max_attempts,
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub log_level: Option<String>,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_seconds_per_point() -> u64 {
    60
}

fn default_min_watch_seconds() -> u64 {
    30
}

fn default_max_ads_per_window() -> u32 {
    5
}

fn default_window_seconds() -> u64 {
    600
}

fn default_multiplier() -> f64 {
    1.0
}

fn default_tick_jitter_ms() -> u64 {
    100
}

fn default_heartbeat_seconds() -> u64 {
    30
}

fn default_shuffle() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    4
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    8_000
}

fn default_balance_refresh_seconds() -> u64 {
    60
}

fn default_rates_refresh_seconds() -> u64 {
    300
}

impl Config {
    /// Config for a backend URL with every other section defaulted.
    pub fn with_backend(base_url: impl Into<String>) -> Self {
        Self {
            backend: BackendConfig {
                base_url: base_url.into(),
                token: None,
                timeout_ms: default_timeout_ms(),
            },
            policy: PolicyConfig::default(),
            session: SessionConfig::default(),
            sync: SyncConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }

    /// Load configuration from ADWATCH_CONFIG (default `config/adwatch.toml`) and apply env
    /// overrides.
    pub fn load_from_env() -> Result<Self> {
        let path = env_config_path();
        let mut cfg = Self::load(&path)?;
        cfg.apply_env_overrides()?;
        Ok(cfg)
    }

    /// Load configuration from a specific file (TOML or JSON based on extension).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let data = fs::read_to_string(path_ref)
            .with_context(|| format!("unable to read config {}", path_ref.display()))?;
        if is_json(path_ref) {
            Ok(serde_json::from_str(&data)
                .with_context(|| format!("invalid JSON config {}", path_ref.display()))?)
        } else {
            Ok(toml::from_str(&data)
                .with_context(|| format!("invalid TOML config {}", path_ref.display()))?)
        }
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = env::var("ADWATCH_BACKEND_URL") {
            if url.trim().is_empty() {
                bail!("ADWATCH_BACKEND_URL is set but empty");
            }
            self.backend.base_url = url;
        }
        if let Ok(token) = env::var("ADWATCH_TOKEN") {
            self.backend.token = if token.is_empty() { None } else { Some(token) };
        }
        if let Ok(level) = env::var("ADWATCH_LOG_LEVEL") {
            self.telemetry.log_level = Some(level);
        }
        Ok(())
    }

    /// Validate invariants the engine relies on.
    pub fn validate(&self) -> Result<()> {
        let url = self.backend.base_url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("backend.base_url must be an http(s) URL, got {url:?}");
        }
        if self.backend.timeout_ms == 0 {
            bail!("backend.timeout_ms must be > 0");
        }
        let policy = &self.policy;
        if policy.seconds_per_point == 0 {
            bail!("policy.seconds_per_point must be > 0");
        }
        if policy.max_countable_seconds_per_ad == Some(0) {
            bail!("policy.max_countable_seconds_per_ad must be > 0 when set");
        }
        if policy.max_ads_per_window == 0 {
            bail!("policy.max_ads_per_window must be > 0");
        }
        if policy.window_seconds == 0 {
            bail!("policy.window_seconds must be > 0");
        }
        validate_multiplier("policy.multiplier", policy.multiplier)?;
        for promo in &policy.promotions {
            validate_multiplier(&format!("promotion {} multiplier", promo.name), promo.multiplier)?;
            if promo.ends_at < promo.starts_at {
                bail!("promotion {} ends before it starts", promo.name);
            }
        }
        if self.session.tick_jitter_ms >= 1_000 {
            bail!("session.tick_jitter_ms must be < 1000");
        }
        if self.session.heartbeat_seconds == 0 {
            bail!("session.heartbeat_seconds must be > 0");
        }
        let sync = &self.sync;
        if sync.max_attempts == 0 {
            bail!("sync.max_attempts must be > 0");
        }
        if sync.backoff_base_ms > sync.backoff_max_ms {
            bail!("sync.backoff_base_ms must not exceed sync.backoff_max_ms");
        }
        if sync.balance_refresh_seconds == 0 || sync.rates_refresh_seconds == 0 {
            bail!("sync refresh periods must be > 0");
        }
        Ok(())
    }
}

fn validate_multiplier(label: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 || value > MAX_MULTIPLIER {
        bail!("{label} must be within (0, {MAX_MULTIPLIER}], got {value}");
    }
    Ok(())
}

fn env_config_path() -> PathBuf {
    env::var("ADWATCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
[backend]
base_url = "https://rewards.local"
token = "secret"

[policy]
seconds_per_point = 60
max_countable_seconds_per_ad = 30
max_ads_per_window = 3
cooldown_seconds = 30

[[policy.promotions]]
name = "ramadan"
multiplier = 2.0
bonus_points = 1
starts_at = "2026-03-01T00:00:00Z"
ends_at = "2026-03-30T00:00:00Z"
applies_to = ["watching"]

[sync]
max_attempts = 2
"#;

    #[test]
    fn parses_toml_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("adwatch.toml");
        fs::write(&path, SAMPLE).unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.backend.token.as_deref(), Some("secret"));
        assert_eq!(cfg.backend.timeout_ms, 10_000);
        assert_eq!(cfg.policy.max_countable_seconds_per_ad, Some(30));
        assert_eq!(cfg.policy.min_watch_seconds, 30);
        assert_eq!(cfg.policy.window_seconds, 600);
        assert_eq!(
            cfg.policy.window_cap().cooldown,
            Some(Duration::from_secs(30))
        );
        assert_eq!(cfg.policy.promotions.len(), 1);
        assert_eq!(cfg.sync.max_attempts, 2);
        assert_eq!(cfg.sync.backoff_max_ms, 8_000);
        assert_eq!(cfg.session.heartbeat_seconds, 30);
        cfg.validate().unwrap();
    }

    #[test]
    fn parses_json_by_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("adwatch.json");
        fs::write(&path, r#"{"backend":{"base_url":"http://localhost:8001"}}"#).unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.policy.seconds_per_point, 60);
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_zero_interval() {
        let mut cfg = Config::with_backend("http://localhost");
        cfg.policy.seconds_per_point = 0;
        let err = cfg.validate().unwrap_err();
        assert!(format!("{err:?}").contains("seconds_per_point"));
    }

    #[test]
    fn rejects_runaway_multiplier() {
        let mut cfg = Config::with_backend("http://localhost");
        cfg.policy.multiplier = 25.0;
        assert!(cfg.validate().is_err());
        cfg.policy.multiplier = f64::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_non_http_backend() {
        let cfg = Config::with_backend("ftp://rewards");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_overrides_backend_and_token() {
        let mut cfg = Config::with_backend("http://localhost");
        env::set_var("ADWATCH_BACKEND_URL", "https://override.local");
        env::set_var("ADWATCH_TOKEN", "tok");
        cfg.apply_env_overrides().unwrap();
        env::remove_var("ADWATCH_BACKEND_URL");
        env::remove_var("ADWATCH_TOKEN");
        assert_eq!(cfg.backend.base_url, "https://override.local");
        assert_eq!(cfg.backend.token.as_deref(), Some("tok"));
    }
}
