//! Bridge and relay configuration loaded from environment variables.
//!
//! All settings come from environment variables (or a `.env` file via
//! `dotenvy`). Unset variables fall back to the bridge defaults.

use std::str::FromStr;
use std::time::Duration;

use crate::domain::notice_bus::DEFAULT_NOTICE_CAPACITY;
use crate::domain::remote_options::{
    DEFAULT_BRIDGE_HOST, DEFAULT_BRIDGE_PORT, DEFAULT_BRIDGE_TIMEOUT, DEFAULT_CORE_TIMEOUT,
};
use crate::domain::{ConnectionTarget, RemoteOptions};
use crate::error::BridgeError;

/// Default relay poll timeout.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Output format for process logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(BridgeError::InvalidConfig(format!(
                "unknown log format {other:?}"
            ))),
        }
    }
}

/// Shortest relay poll timeout. A zero timeout would turn the poll into a
/// busy loop.
pub const MIN_POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Top-level configuration.
///
/// Loaded once at startup via [`BridgeConfig::from_env`], or built with
/// [`Default`] in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Host running the bridge server.
    pub host: String,

    /// Bridge port of the remote application.
    pub port: u16,

    /// Timeout for calls on plugin and studio objects.
    pub timeout: Duration,

    /// Timeout for calls on the core.
    pub core_timeout: Duration,

    /// Translate remote camelCase names.
    pub convert_camel_case: bool,

    /// Ask the bridge for debug output.
    pub debug: bool,

    /// How long a relay waits for one message before rechecking for close.
    pub relay_poll_timeout: Duration,

    /// Capacity of each relay's notice bus.
    pub notice_capacity: usize,

    /// Log output format for the demo binary.
    pub log_format: LogFormat,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BRIDGE_HOST.to_string(),
            port: DEFAULT_BRIDGE_PORT,
            timeout: DEFAULT_BRIDGE_TIMEOUT,
            core_timeout: DEFAULT_CORE_TIMEOUT,
            convert_camel_case: true,
            debug: false,
            relay_poll_timeout: DEFAULT_POLL_TIMEOUT,
            notice_capacity: DEFAULT_NOTICE_CAPACITY,
            log_format: LogFormat::Text,
        }
    }
}

impl BridgeConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] if `BRIDGE_PORT` is set but is
    /// not a valid non-zero port, or if `RELAY_POLL_TIMEOUT_MS` is `0`.
    pub fn from_env() -> Result<Self, BridgeError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`BridgeConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BridgeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = lookup("BRIDGE_HOST").unwrap_or(defaults.host);

        let port = match lookup("BRIDGE_PORT") {
            Some(raw) => match raw.trim().parse::<u16>() {
                Ok(port) if port != 0 => port,
                _ => {
                    return Err(BridgeError::InvalidConfig(format!(
                        "BRIDGE_PORT must be a port number in 1..=65535, got {raw:?}"
                    )));
                }
            },
            None => defaults.port,
        };

        let timeout = parse_millis(&lookup, "BRIDGE_TIMEOUT_MS", defaults.timeout);
        let core_timeout = parse_millis(&lookup, "CORE_TIMEOUT_MS", defaults.core_timeout);
        let convert_camel_case = parse_bool(
            &lookup,
            "BRIDGE_CONVERT_CAMEL_CASE",
            defaults.convert_camel_case,
        );
        let debug = parse_bool(&lookup, "BRIDGE_DEBUG", defaults.debug);
        let relay_poll_timeout =
            parse_millis(&lookup, "RELAY_POLL_TIMEOUT_MS", defaults.relay_poll_timeout);
        if relay_poll_timeout < MIN_POLL_TIMEOUT {
            return Err(BridgeError::InvalidConfig(
                "RELAY_POLL_TIMEOUT_MS must be at least 1".to_string(),
            ));
        }
        let notice_capacity = parse(&lookup, "RELAY_NOTICE_CAPACITY", defaults.notice_capacity);
        let log_format = parse(&lookup, "LOG_FORMAT", defaults.log_format);

        Ok(Self {
            host,
            port,
            timeout,
            core_timeout,
            convert_camel_case,
            debug,
            relay_poll_timeout,
            notice_capacity,
            log_format,
        })
    }

    /// Returns the configured bridge connection.
    #[must_use]
    pub fn target(&self) -> ConnectionTarget {
        ConnectionTarget::new(self.host.clone(), self.port)
    }

    /// Option defaults for studio and plugin objects.
    #[must_use]
    pub fn default_options(&self) -> RemoteOptions {
        RemoteOptions {
            target: self.target(),
            convert_camel_case: self.convert_camel_case,
            new_socket: false,
            debug: self.debug,
            timeout: self.timeout,
        }
    }

    /// Option defaults for the core, which uses a longer timeout.
    #[must_use]
    pub fn core_options(&self) -> RemoteOptions {
        self.default_options().with_timeout(self.core_timeout)
    }
}

/// Parses a variable as `T`, returning `default` on missing or invalid
/// values.
fn parse<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parses a variable holding milliseconds.
fn parse_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

/// Parses a variable as a boolean. Accepts `"true"`, `"1"`, `"false"`,
/// `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<BridgeConfig, BridgeError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        BridgeConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let Ok(config) = from_pairs(&[]) else {
            panic!("defaults should load");
        };
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.port, 4827);
        assert_eq!(config.relay_poll_timeout, Duration::from_millis(100));
    }

    #[test]
    fn overrides_are_applied() {
        let Ok(config) = from_pairs(&[
            ("BRIDGE_HOST", "10.0.0.5"),
            ("BRIDGE_PORT", "5000"),
            ("RELAY_POLL_TIMEOUT_MS", "25"),
            ("BRIDGE_DEBUG", "TRUE"),
            ("BRIDGE_CONVERT_CAMEL_CASE", "0"),
        ]) else {
            panic!("config should load");
        };
        assert_eq!(config.target().to_string(), "10.0.0.5:5000");
        assert_eq!(config.relay_poll_timeout, Duration::from_millis(25));
        assert!(config.debug);
        assert!(!config.convert_camel_case);
    }

    #[test]
    fn invalid_port_is_an_error() {
        assert!(matches!(
            from_pairs(&[("BRIDGE_PORT", "not-a-port")]),
            Err(BridgeError::InvalidConfig(_))
        ));
        assert!(matches!(
            from_pairs(&[("BRIDGE_PORT", "0")]),
            Err(BridgeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn zero_poll_timeout_is_an_error() {
        let result = from_pairs(&[("RELAY_POLL_TIMEOUT_MS", "0")]);
        let Err(BridgeError::InvalidConfig(message)) = result else {
            panic!("expected InvalidConfig");
        };
        assert!(message.contains("RELAY_POLL_TIMEOUT_MS"));

        let Ok(config) = from_pairs(&[("RELAY_POLL_TIMEOUT_MS", "1")]) else {
            panic!("1 ms should load");
        };
        assert_eq!(config.relay_poll_timeout, MIN_POLL_TIMEOUT);
    }

    #[test]
    fn log_format_is_read() {
        let Ok(config) = from_pairs(&[("LOG_FORMAT", "JSON")]) else {
            panic!("config should load");
        };
        assert_eq!(config.log_format, LogFormat::Json);

        let Ok(config) = from_pairs(&[("LOG_FORMAT", "yaml")]) else {
            panic!("config should load");
        };
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn invalid_optional_values_fall_back() {
        let Ok(config) = from_pairs(&[
            ("BRIDGE_TIMEOUT_MS", "soon"),
            ("RELAY_NOTICE_CAPACITY", "-3"),
        ]) else {
            panic!("config should load");
        };
        assert_eq!(config.timeout, DEFAULT_BRIDGE_TIMEOUT);
        assert_eq!(config.notice_capacity, DEFAULT_NOTICE_CAPACITY);
    }

    #[test]
    fn core_options_use_core_timeout() {
        let config = BridgeConfig::default();
        assert_eq!(config.core_options().timeout, Duration::from_millis(1000));
        assert_eq!(config.default_options().timeout, Duration::from_millis(500));
    }
}
