//! Service configuration
//!
//! Built once before start and immutable afterwards. Values come from
//! `Configuration::default()` or from `LIGHTSHIP_*` environment variables.

use crate::lifecycle::signals::SignalName;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default port for the probe endpoints
pub const DEFAULT_PORT: u16 = 9000;

/// Default bound on the whole shutdown sequence
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

pub const ENV_PORT: &str = "LIGHTSHIP_PORT";
pub const ENV_SHUTDOWN_TIMEOUT: &str = "LIGHTSHIP_SHUTDOWN_TIMEOUT";
pub const ENV_SIGNALS: &str = "LIGHTSHIP_SIGNALS";
pub const ENV_DETECT_KUBERNETES: &str = "LIGHTSHIP_DETECT_KUBERNETES";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("Unknown signal name: {0}")]
    UnknownSignal(String),
}

/// Upper bound on the shutdown sequence before a forced exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTimeout {
    Finite(Duration),
    Infinite,
}

impl ShutdownTimeout {
    pub fn from_millis(ms: u64) -> Self {
        ShutdownTimeout::Finite(Duration::from_millis(ms))
    }

    /// `None` when the timeout is infinite
    pub fn duration(&self) -> Option<Duration> {
        match self {
            ShutdownTimeout::Finite(d) => Some(*d),
            ShutdownTimeout::Infinite => None,
        }
    }
}

impl FromStr for ShutdownTimeout {
    type Err = String;

    /// Milliseconds, or `infinite`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("infinite") || s.eq_ignore_ascii_case("infinity") {
            return Ok(ShutdownTimeout::Infinite);
        }
        s.parse::<u64>()
            .map(ShutdownTimeout::from_millis)
            .map_err(|e| format!("expected milliseconds or \"infinite\": {}", e))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    /// Port for `/health`, `/live`, `/ready` and `/metrics`
    pub port: u16,
    pub timeout: ShutdownTimeout,
    /// Signals that trigger shutdown, in binding order, without duplicates
    pub signals: Vec<SignalName>,
    /// Skip signal wiring and bind an ephemeral port when not in Kubernetes
    pub detect_kubernetes: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout: ShutdownTimeout::Finite(DEFAULT_SHUTDOWN_TIMEOUT),
            signals: vec![SignalName::Term, SignalName::Hup, SignalName::Int],
            detect_kubernetes: true,
        }
    }
}

impl Configuration {
    /// Load configuration from `LIGHTSHIP_*` environment variables
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_PORT) {
            config.port = value.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid {
                    key: ENV_PORT,
                    value: value.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        if let Some(value) = lookup(ENV_SHUTDOWN_TIMEOUT) {
            config.timeout = value.parse().map_err(|reason| ConfigError::Invalid {
                key: ENV_SHUTDOWN_TIMEOUT,
                value: value.clone(),
                reason,
            })?;
        }

        if let Some(value) = lookup(ENV_SIGNALS) {
            config.signals = parse_signal_list(&value)?;
        }

        if let Some(value) = lookup(ENV_DETECT_KUBERNETES) {
            config.detect_kubernetes = parse_bool(&value).ok_or(ConfigError::Invalid {
                key: ENV_DETECT_KUBERNETES,
                value: value.clone(),
                reason: "expected true, false, 1 or 0".to_string(),
            })?;
        }

        Ok(config)
    }
}

/// Parse a comma-separated signal list, dropping duplicates
fn parse_signal_list(value: &str) -> Result<Vec<SignalName>, ConfigError> {
    let mut signals = Vec::new();
    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let signal: SignalName = name
            .parse()
            .map_err(|_| ConfigError::UnknownSignal(name.to_string()))?;
        if !signals.contains(&signal) {
            signals.push(signal);
        }
    }
    Ok(signals)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "config_test.rs"]
mod tests;
