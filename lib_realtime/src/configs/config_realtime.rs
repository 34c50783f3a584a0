//! # Real-time Client Configuration
//!
//! `RealtimeConfig` is the single value a page hands to
//! [`RealtimeClient::new`](crate::client::RealtimeClient::new): where the
//! socket lives, how reconnection backs off, and how update frames are
//! matched to subscriptions. Every field has a default, so a JSON file only
//! needs to list what it changes.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use super::extraction::ExtractionRules;
use crate::core::backoff::ReconnectPolicy;

/// Errors raised while loading or validating a [`RealtimeConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),

    /// The configuration text is not valid JSON for this schema.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// The endpoint is not an absolute `ws://` or `wss://` URL.
    #[error("Invalid endpoint {url:?}: {reason}")]
    InvalidEndpoint {
        /// The rejected endpoint.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A numeric setting is out of range.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Connection, backoff and routing settings for the real-time client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Base URL of the real-time service, e.g. `ws://localhost:8000`.
    pub endpoint: String,
    /// Socket path appended to `endpoint`.
    pub path: String,
    /// Preferred client identifier, sent as the `client_id` query parameter.
    pub client_id: Option<String>,
    /// Delay before the first reconnect attempt.
    pub reconnect_base_delay_ms: u64,
    /// Growth factor applied per further attempt.
    pub reconnect_multiplier: f64,
    /// Reconnect attempts before giving up for good.
    pub max_reconnect_attempts: u32,
    /// Interval between keepalive pings while connected.
    pub keepalive_interval_ms: u64,
    /// Deadline for opening the socket and receiving the acknowledgement frame.
    pub connect_timeout_ms: u64,
    /// Deadline for a subscribe/unsubscribe confirmation.
    pub request_timeout_ms: u64,
    /// Collection → entity-id field table used to route update frames.
    pub extraction: ExtractionRules,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8000".to_string(),
            path: "/ws/realtime".to_string(),
            client_id: None,
            reconnect_base_delay_ms: 2_000,
            reconnect_multiplier: 1.5,
            max_reconnect_attempts: 5,
            keepalive_interval_ms: 30_000,
            connect_timeout_ms: 10_000,
            request_timeout_ms: 10_000,
            extraction: ExtractionRules::default(),
        }
    }
}

impl RealtimeConfig {
    /// Default settings pointed at `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: RealtimeConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Checks the settings that would otherwise fail only at connect time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_url()?;

        if !self.reconnect_multiplier.is_finite() || self.reconnect_multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "reconnect_multiplier",
                reason: format!("must be a finite number >= 1.0, got {}", self.reconnect_multiplier),
            });
        }
        if self.keepalive_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "keepalive_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "connect_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Full socket URL: `endpoint` + `path`, plus `?client_id=` when set.
    pub fn socket_url(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidEndpoint {
            url: self.endpoint.clone(),
            reason,
        };

        let mut url = Url::parse(&self.endpoint).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
        }

        let base = url.path().trim_end_matches('/').to_string();
        let suffix = self.path.trim_start_matches('/');
        url.set_path(&format!("{}/{}", base, suffix));

        if let Some(client_id) = &self.client_id {
            url.query_pairs_mut().append_pair("client_id", client_id);
        }
        Ok(url)
    }

    /// Backoff schedule derived from the reconnect settings.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.reconnect_base_delay_ms),
            self.reconnect_multiplier,
            self.max_reconnect_attempts,
        )
    }

    /// Keepalive period.
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    /// Socket open + acknowledgement deadline.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Subscribe/unsubscribe confirmation deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_dashboard_service() {
        let config = RealtimeConfig::default();
        assert_eq!(config.reconnect_base_delay_ms, 2_000);
        assert_eq!(config.reconnect_multiplier, 1.5);
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.keepalive_interval(), Duration::from_secs(30));
        assert_eq!(
            config.socket_url().unwrap().as_str(),
            "ws://localhost:8000/ws/realtime"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RealtimeConfig::from_json_str(
            r#"{"endpoint": "wss://campus.example.edu", "max_reconnect_attempts": 8}"#,
        )
        .unwrap();
        assert_eq!(config.max_reconnect_attempts, 8);
        assert_eq!(config.path, "/ws/realtime");
        assert_eq!(config.extraction, ExtractionRules::default());
    }

    #[test]
    fn socket_url_keeps_endpoint_prefix_and_client_id() {
        let mut config = RealtimeConfig::new("ws://10.0.0.5:9000/scheduler/");
        config.client_id = Some("admin panel".to_string());
        assert_eq!(
            config.socket_url().unwrap().as_str(),
            "ws://10.0.0.5:9000/scheduler/ws/realtime?client_id=admin+panel"
        );
    }

    #[test]
    fn rejects_http_endpoints() {
        let config = RealtimeConfig::new("http://localhost:8000");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn rejects_shrinking_backoff() {
        let mut config = RealtimeConfig::default();
        config.reconnect_multiplier = 0.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "reconnect_multiplier", .. })
        ));
    }

    #[test]
    fn load_reads_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"endpoint": "ws://127.0.0.1:8000", "extraction": {{"rooms": ["room_id"]}}}}"#
        )
        .unwrap();

        let config = RealtimeConfig::load(file.path()).unwrap();
        assert_eq!(config.endpoint, "ws://127.0.0.1:8000");
        assert!(config.extraction.fields_for("rooms").is_some());
        assert!(config.extraction.fields_for("schedules").is_none());
    }

    #[test]
    fn load_reports_missing_files() {
        let result = RealtimeConfig::load(Path::new("/definitely/not/here.json"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
