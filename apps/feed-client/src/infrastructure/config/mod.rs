//! Client Configuration Settings
//!
//! Configuration types for the feed client, loaded from environment
//! variables with sensible defaults everywhere except the endpoint URL.

use std::path::PathBuf;
use std::time::Duration;

use crate::infrastructure::cache::DEFAULT_MAX_AGE;
use crate::infrastructure::transport::{BackoffConfig, LivenessConfig, TransportKind};

/// Default number of alert entries retained in memory.
pub const DEFAULT_ALERT_LOG_CAP: usize = 50;

/// Snapshot cache settings.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Database file path. `None` keeps snapshots in memory only.
    pub path: Option<PathBuf>,
    /// Freshness window for cached snapshots served at cold start.
    pub max_age: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            path: None,
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

/// Complete feed client configuration.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Endpoint URL for the streaming feed.
    pub url: String,
    /// Transport adapter to connect with.
    pub transport: TransportKind,
    /// Reconnection backoff settings.
    pub backoff: BackoffConfig,
    /// Heartbeat liveness settings.
    pub liveness: LivenessConfig,
    /// Snapshot cache settings.
    pub cache: CacheSettings,
    /// Maximum number of alert entries retained.
    pub alert_log_cap: usize,
    /// Start connecting as soon as the client is constructed.
    pub auto_activate: bool,
}

impl FeedSettings {
    /// Create settings with defaults for everything but the URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            transport: TransportKind::Duplex,
            backoff: BackoffConfig::default(),
            liveness: LivenessConfig::default(),
            cache: CacheSettings::default(),
            alert_log_cap: DEFAULT_ALERT_LOG_CAP,
            auto_activate: true,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `FEED_URL` is missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("FEED_URL")
            .map_err(|_| ConfigError::MissingEnvVar("FEED_URL".to_string()))?;
        if url.is_empty() {
            return Err(ConfigError::EmptyValue("FEED_URL".to_string()));
        }

        let transport = std::env::var("FEED_TRANSPORT")
            .map(|s| TransportKind::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let backoff = BackoffConfig {
            initial_delay: parse_env_duration_millis(
                "FEED_RECONNECT_DELAY_INITIAL_MS",
                BackoffConfig::default().initial_delay,
            ),
            max_delay: parse_env_duration_secs(
                "FEED_RECONNECT_DELAY_MAX_SECS",
                BackoffConfig::default().max_delay,
            ),
            multiplier: parse_env_f64(
                "FEED_RECONNECT_DELAY_MULTIPLIER",
                BackoffConfig::default().multiplier,
            ),
            jitter_factor: parse_env_f64(
                "FEED_RECONNECT_JITTER_FACTOR",
                BackoffConfig::default().jitter_factor,
            ),
            max_attempts: parse_env_u32(
                "FEED_MAX_RECONNECT_ATTEMPTS",
                BackoffConfig::default().max_attempts,
            ),
        };

        let liveness = LivenessConfig {
            poll_interval: parse_env_duration_secs(
                "FEED_LIVENESS_POLL_INTERVAL_SECS",
                LivenessConfig::default().poll_interval,
            ),
            stale_after: parse_env_duration_secs(
                "FEED_LIVENESS_STALE_AFTER_SECS",
                LivenessConfig::default().stale_after,
            ),
        };

        let cache = CacheSettings {
            path: std::env::var("FEED_CACHE_PATH").ok().map(PathBuf::from),
            max_age: parse_env_duration_secs(
                "FEED_CACHE_MAX_AGE_SECS",
                CacheSettings::default().max_age,
            ),
        };

        Ok(Self {
            url,
            transport,
            backoff,
            liveness,
            cache,
            alert_log_cap: parse_env_usize("FEED_ALERT_LOG_CAP", DEFAULT_ALERT_LOG_CAP),
            auto_activate: parse_env_bool("FEED_AUTO_ACTIVATE", true),
        })
    }
}

impl TransportKind {
    /// Parse transport kind from string, defaulting to the duplex
    /// WebSocket adapter for unrecognized values.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "sse" | "push" | "push-stream" => Self::PushStream,
            _ => Self::Duplex,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
