//! Agent configuration.
//!
//! Deserialized from camelCase JSON; every field except `propertyKey` has a
//! default. `validate` runs before anything is wired so a bad config fails
//! at build time instead of at the first flush.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::app::engine::DeliveryConfig;
use crate::domain::errors::ConfigError;

pub const DEFAULT_ENDPOINT: &str = "https://api.wolftics.com/collect";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    pub property_key: String,
    pub endpoint: String,
    /// Origin of the embedding page; decides whether the beacon may be used.
    /// Falls back to the origin of `page_url`.
    pub page_origin: Option<String>,
    pub page_url: Option<String>,
    pub spa: bool,
    pub max_queue_size: usize,
    pub max_persisted_events: usize,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub max_attempts_per_event: u32,
    pub session_timeout_minutes: u64,
    /// 0 disables the heartbeat.
    pub heartbeat_seconds: u64,
    pub exit_events: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            property_key: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            page_origin: None,
            page_url: None,
            spa: false,
            max_queue_size: 500,
            max_persisted_events: 800,
            batch_size: 20,
            flush_interval_ms: 2000,
            request_timeout_ms: 8000,
            initial_retry_delay_ms: 1000,
            max_retry_delay_ms: 30_000,
            max_attempts_per_event: 10,
            session_timeout_minutes: 30,
            heartbeat_seconds: 15,
            exit_events: true,
        }
    }
}

impl AgentConfig {
    pub fn new(property_key: impl Into<String>) -> Self {
        Self {
            property_key: property_key.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.property_key.trim().is_empty() {
            return Err(ConfigError::MissingPropertyKey);
        }
        self.endpoint_url()?;
        self.page_origin_url()?;
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::ZeroQueueSize);
        }
        if self.initial_retry_delay_ms == 0 || self.initial_retry_delay_ms > self.max_retry_delay_ms
        {
            return Err(ConfigError::RetryDelayRange {
                initial: self.initial_retry_delay_ms,
                max: self.max_retry_delay_ms,
            });
        }
        Ok(())
    }

    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            reason,
        };
        let url = Url::parse(&self.endpoint).map_err(|e| invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(invalid(format!("unsupported scheme {other:?}"))),
        }
    }

    /// The page origin, from `pageOrigin` or else `pageUrl`.
    pub fn page_origin_url(&self) -> Result<Option<Url>, ConfigError> {
        let Some(raw) = self.page_origin.as_ref().or(self.page_url.as_ref()) else {
            return Ok(None);
        };
        Url::parse(raw)
            .map(Some)
            .map_err(|e| ConfigError::InvalidPageOrigin {
                origin: raw.clone(),
                reason: e.to_string(),
            })
    }

    pub fn page_url(&self) -> Option<Url> {
        self.page_url.as_deref().and_then(|u| Url::parse(u).ok())
    }

    pub fn delivery(&self) -> DeliveryConfig {
        DeliveryConfig {
            property_key: self.property_key.clone(),
            max_queue_size: self.max_queue_size,
            max_persisted_events: self.max_persisted_events,
            batch_size: self.batch_size,
            initial_retry_delay: Duration::from_millis(self.initial_retry_delay_ms),
            max_retry_delay: Duration::from_millis(self.max_retry_delay_ms),
            max_attempts_per_event: self.max_attempts_per_event,
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_minutes.saturating_mul(60))
    }

    pub fn heartbeat(&self) -> Option<Duration> {
        (self.heartbeat_seconds > 0).then(|| Duration::from_secs(self.heartbeat_seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = AgentConfig::from_json(r#"{"propertyKey":"pk_live","batchSize":5}"#).unwrap();

        assert_eq!(config.batch_size, 5);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.max_queue_size, 500);
        assert_eq!(config.max_persisted_events, 800);
        assert_eq!(config.flush_interval(), Duration::from_secs(2));
        assert_eq!(config.request_timeout(), Duration::from_secs(8));
        assert_eq!(config.session_timeout(), Duration::from_secs(30 * 60));
        assert_eq!(config.heartbeat(), Some(Duration::from_secs(15)));
        assert!(config.exit_events);
        config.validate().unwrap();
    }

    #[test]
    fn missing_property_key_is_rejected() {
        let config = AgentConfig::from_json("{}").unwrap();
        assert_eq!(config.validate(), Err(ConfigError::MissingPropertyKey));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let bad_endpoint = AgentConfig {
            endpoint: "ftp://example.com/collect".into(),
            ..AgentConfig::new("pk")
        };
        assert!(matches!(
            bad_endpoint.validate(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));

        let zero_batch = AgentConfig {
            batch_size: 0,
            ..AgentConfig::new("pk")
        };
        assert_eq!(zero_batch.validate(), Err(ConfigError::ZeroBatchSize));

        let inverted = AgentConfig {
            initial_retry_delay_ms: 60_000,
            ..AgentConfig::new("pk")
        };
        assert!(matches!(
            inverted.validate(),
            Err(ConfigError::RetryDelayRange { initial: 60_000, .. })
        ));

        let bad_origin = AgentConfig {
            page_origin: Some("not a url".into()),
            ..AgentConfig::new("pk")
        };
        assert!(matches!(
            bad_origin.validate(),
            Err(ConfigError::InvalidPageOrigin { .. })
        ));
    }

    #[test]
    fn page_origin_falls_back_to_page_url() {
        let config = AgentConfig {
            page_url: Some("https://shop.example/cart?utm_source=x".into()),
            ..AgentConfig::new("pk")
        };
        let origin = config.page_origin_url().unwrap().unwrap();
        assert_eq!(origin.host_str(), Some("shop.example"));
    }

    #[test]
    fn zero_heartbeat_disables_it() {
        let config = AgentConfig {
            heartbeat_seconds: 0,
            ..AgentConfig::new("pk")
        };
        assert_eq!(config.heartbeat(), None);
    }
}
