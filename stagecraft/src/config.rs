//! Engine configuration.

use crate::errors::WorkflowError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Logging output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset (e.g. "info").
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

/// Configuration for the workflow engine and reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the remote workflow API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Polling interval of the reconciler, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Active stages older than this are considered abandoned, in seconds.
    #[serde(default = "default_stale_active_after_secs")]
    pub stale_active_after_secs: u64,
    /// Timeout for a single remote request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_api_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_stale_active_after_secs() -> u64 {
    30 * 60
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            poll_interval_ms: default_poll_interval_ms(),
            stale_active_after_secs: default_stale_active_after_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, WorkflowError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Sets the API base URL.
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Sets the polling interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the stale-active threshold.
    #[must_use]
    pub fn with_stale_active_after(mut self, after: Duration) -> Self {
        self.stale_active_after_secs = after.as_secs();
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs();
        self
    }

    /// Polling interval as a duration. Never zero.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Stale-active threshold as a duration.
    #[must_use]
    pub fn stale_active_after(&self) -> Duration {
        Duration::from_secs(self.stale_active_after_secs)
    }

    /// Request timeout as a duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.stale_active_after(), Duration::from_secs(1800));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = EngineConfig::from_json_str(r#"{"poll_interval_ms": 250}"#).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.api_base_url, "http://localhost:3000/api");
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            EngineConfig::from_json_str("{"),
            Err(WorkflowError::Serialization(_))
        ));
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::new()
            .with_api_base_url("https://api.example.com")
            .with_poll_interval(Duration::from_millis(0))
            .with_request_timeout(Duration::from_secs(5));
        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }
}
