//! Scoreboard Configuration Settings
//!
//! Configuration types for the relay and the viewer, loaded from environment
//! variables. Unparseable numbers fall back to their defaults; values that
//! parse but make no sense (empty host, zero port, zero window) are errors.

use std::time::Duration;

use crate::domain::aggregator::DEFAULT_WINDOW;
use crate::domain::chart::{InstrumentLabels, LabelParseError};
use crate::domain::connection::RetryPolicy;

/// Route the relay serves WebSocket upgrades on.
pub const RELAY_PATH: &str = "/api/socket";

/// Relay process settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    /// Port the relay route listens on.
    pub relay_port: u16,
    /// Health check and metrics HTTP port.
    pub health_port: u16,
    /// Upstream source host.
    pub upstream_host: String,
    /// Upstream source port.
    pub upstream_port: u16,
    /// Timeout for opening an upstream connection.
    pub upstream_connect_timeout: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            relay_port: 3000,
            health_port: 8083,
            upstream_host: "localhost".to_string(),
            upstream_port: 9002,
            upstream_connect_timeout: Duration::from_millis(5000),
        }
    }
}

impl RelaySettings {
    /// WebSocket URL of the upstream source.
    #[must_use]
    pub fn upstream_url(&self) -> String {
        format!("ws://{}:{}", self.upstream_host, self.upstream_port)
    }
}

/// Viewer process settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerSettings {
    /// Host of the relay (or any source speaking the snapshot protocol).
    pub source_host: String,
    /// Port of the source.
    pub source_port: u16,
    /// Path on the source.
    pub source_path: String,
    /// Automatic reconnect cap and delay.
    pub retry: RetryPolicy,
    /// Samples kept per instrument.
    pub window: usize,
    /// Display names for instruments.
    pub labels: InstrumentLabels,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            source_host: "localhost".to_string(),
            source_port: 3000,
            source_path: RELAY_PATH.to_string(),
            retry: RetryPolicy::default(),
            window: DEFAULT_WINDOW,
            labels: InstrumentLabels::production(),
        }
    }
}

impl ViewerSettings {
    /// WebSocket URL the viewer connects to.
    #[must_use]
    pub fn source_url(&self) -> String {
        let path = if self.source_path.starts_with('/') {
            self.source_path.clone()
        } else {
            format!("/{}", self.source_path)
        };
        format!("ws://{}:{}{}", self.source_host, self.source_port, path)
    }
}

/// Complete scoreboard configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreboardConfig {
    /// Relay settings.
    pub relay: RelaySettings,
    /// Viewer settings.
    pub viewer: ViewerSettings,
}

impl ScoreboardConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let relay_defaults = RelaySettings::default();
        let viewer_defaults = ViewerSettings::default();

        let relay = RelaySettings {
            relay_port: parse_port(&lookup, "SCOREBOARD_RELAY_PORT", relay_defaults.relay_port)?,
            health_port: parse_port(
                &lookup,
                "SCOREBOARD_HEALTH_PORT",
                relay_defaults.health_port,
            )?,
            upstream_host: parse_host(
                &lookup,
                "SCOREBOARD_UPSTREAM_HOST",
                relay_defaults.upstream_host,
            )?,
            upstream_port: parse_port(
                &lookup,
                "SCOREBOARD_UPSTREAM_PORT",
                relay_defaults.upstream_port,
            )?,
            upstream_connect_timeout: parse_duration_millis(
                &lookup,
                "SCOREBOARD_UPSTREAM_CONNECT_TIMEOUT_MS",
                relay_defaults.upstream_connect_timeout,
            ),
        };

        let window = parse_number(&lookup, "SCOREBOARD_WINDOW", viewer_defaults.window);
        if window == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SCOREBOARD_WINDOW".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let labels = match lookup("SCOREBOARD_INSTRUMENT_LABELS") {
            Some(spec) => InstrumentLabels::parse(&spec).map_err(ConfigError::Labels)?,
            None => viewer_defaults.labels,
        };

        let viewer = ViewerSettings {
            source_host: parse_host(
                &lookup,
                "SCOREBOARD_SOURCE_HOST",
                viewer_defaults.source_host,
            )?,
            source_port: parse_port(
                &lookup,
                "SCOREBOARD_SOURCE_PORT",
                viewer_defaults.source_port,
            )?,
            source_path: lookup("SCOREBOARD_SOURCE_PATH")
                .filter(|p| !p.trim().is_empty())
                .unwrap_or(viewer_defaults.source_path),
            retry: RetryPolicy {
                max_attempts: parse_number(
                    &lookup,
                    "SCOREBOARD_MAX_RECONNECT_ATTEMPTS",
                    viewer_defaults.retry.max_attempts,
                ),
                delay: parse_duration_millis(
                    &lookup,
                    "SCOREBOARD_RECONNECT_DELAY_MS",
                    viewer_defaults.retry.delay,
                ),
            },
            window,
            labels,
        };

        Ok(Self { relay, viewer })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),

    /// Environment variable parsed but is out of range.
    #[error("environment variable {key} is invalid: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Instrument label list is malformed.
    #[error("invalid SCOREBOARD_INSTRUMENT_LABELS: {0}")]
    Labels(#[source] LabelParseError),
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_port<F>(lookup: &F, key: &str, default: u16) -> Result<u16, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_number(lookup, key, default) {
        0 => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: "port must be non-zero".to_string(),
        }),
        port => Ok(port),
    }
}

fn parse_host<F>(lookup: &F, key: &str, default: String) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
        Some(value) => Ok(value.trim().to_string()),
        None => Ok(default),
    }
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
