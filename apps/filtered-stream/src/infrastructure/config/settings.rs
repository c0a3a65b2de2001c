//! Service Configuration Settings
//!
//! Configuration types for the stream simulator, loaded from environment
//! variables. Unset or unparsable values fall back to defaults; values that
//! parse but make no sense are rejected.

use std::time::Duration;

use crate::application::services::DispatcherConfig;
use crate::domain::streaming::MIN_DELAY_MS;

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Streaming API port.
    pub http_port: u16,
    /// Health check and metrics port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_port: 8080,
            health_port: 8081,
        }
    }
}

/// Delivery loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    /// Tick interval when a request gives no `delay_ms`.
    pub default_delay_ms: u64,
    /// Largest accepted `delay_ms`.
    pub max_delay_ms: u64,
    /// Recent-window size for sample and firehose streams.
    pub recent_window: usize,
    /// Candidate snapshot refresh for sample and firehose streams.
    pub snapshot_refresh: Duration,
    /// Rule refresh for search streams.
    pub rule_refresh: Duration,
    /// Language stream refresh while empty.
    pub language_empty_refresh: Duration,
    /// Language stream refresh once populated.
    pub language_refresh: Duration,
    /// Lines buffered per connection before the loop waits on the client.
    pub channel_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            default_delay_ms: 100,
            max_delay_ms: 10_000,
            recent_window: 10,
            snapshot_refresh: Duration::from_secs(5),
            rule_refresh: Duration::from_secs(2),
            language_empty_refresh: Duration::from_millis(500),
            language_refresh: Duration::from_secs(5),
            channel_capacity: 256,
        }
    }
}

impl StreamSettings {
    /// Delivery loop tuning derived from these settings.
    #[must_use]
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            default_delay_ms: self.default_delay_ms,
            max_delay_ms: self.max_delay_ms,
            recent_window: self.recent_window,
            snapshot_refresh: self.snapshot_refresh,
            rule_refresh: self.rule_refresh,
            language_empty_refresh: self.language_empty_refresh,
            language_refresh: self.language_refresh,
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Server port settings.
    pub server: ServerSettings,
    /// Delivery loop settings.
    pub stream: StreamSettings,
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is out of range.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let server_defaults = ServerSettings::default();
        let stream_defaults = StreamSettings::default();

        let server = ServerSettings {
            http_port: parse_or(&lookup, "STREAM_HTTP_PORT", server_defaults.http_port),
            health_port: parse_or(&lookup, "STREAM_HEALTH_PORT", server_defaults.health_port),
        };

        let stream = StreamSettings {
            default_delay_ms: parse_or(
                &lookup,
                "STREAM_DEFAULT_DELAY_MS",
                stream_defaults.default_delay_ms,
            ),
            max_delay_ms: parse_or(&lookup, "STREAM_MAX_DELAY_MS", stream_defaults.max_delay_ms),
            recent_window: parse_or(
                &lookup,
                "STREAM_RECENT_WINDOW",
                stream_defaults.recent_window,
            ),
            snapshot_refresh: parse_millis_or(
                &lookup,
                "STREAM_SNAPSHOT_REFRESH_MS",
                stream_defaults.snapshot_refresh,
            ),
            rule_refresh: parse_millis_or(
                &lookup,
                "STREAM_RULE_REFRESH_MS",
                stream_defaults.rule_refresh,
            ),
            language_empty_refresh: parse_millis_or(
                &lookup,
                "STREAM_LANG_EMPTY_REFRESH_MS",
                stream_defaults.language_empty_refresh,
            ),
            language_refresh: parse_millis_or(
                &lookup,
                "STREAM_LANG_REFRESH_MS",
                stream_defaults.language_refresh,
            ),
            channel_capacity: parse_or(
                &lookup,
                "STREAM_CHANNEL_CAPACITY",
                stream_defaults.channel_capacity,
            ),
        };

        let config = Self { server, stream };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.http_port != 0 && self.server.http_port == self.server.health_port {
            return Err(ConfigError::InvalidValue {
                key: "STREAM_HEALTH_PORT",
                reason: "must differ from STREAM_HTTP_PORT".to_string(),
            });
        }
        if self.stream.max_delay_ms < MIN_DELAY_MS {
            return Err(ConfigError::InvalidValue {
                key: "STREAM_MAX_DELAY_MS",
                reason: format!("must be at least {MIN_DELAY_MS}"),
            });
        }
        if self.stream.recent_window == 0 {
            return Err(ConfigError::InvalidValue {
                key: "STREAM_RECENT_WINDOW",
                reason: "must be positive".to_string(),
            });
        }
        if self.stream.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "STREAM_CHANNEL_CAPACITY",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable holds an unusable value.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Offending variable.
        key: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_millis_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
