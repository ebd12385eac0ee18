//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and key is optional; an empty file yields
//! [`Config::default()`].
//!
//! ```toml
//! [device]
//! poll_interval_ms = 50
//! preferred = "xbox"
//!
//! [remap]
//! timeout_ms = 10000
//!
//! [storage]
//! path = "./gamepad-mappings.json"
//!
//! [relay]
//! url = "ws://127.0.0.1:3001/ws"
//! ```

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{RelayPilotError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub remap: RemapConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Input device configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DeviceConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_roster_interval_ms")]
    pub roster_interval_ms: u64,

    /// Device id or name fragment to select on start (empty: first gamepad)
    #[serde(default)]
    pub preferred: String,
}

/// Remap workflow configuration
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct RemapConfig {
    /// Cancel an armed remap after this long (0: wait indefinitely)
    #[serde(default)]
    pub timeout_ms: u64,
}

/// Mapping persistence configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: String,
}

/// Relay connection configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RelayConfig {
    #[serde(default = "default_relay_enabled")]
    pub enabled: bool,

    #[serde(default = "default_relay_url")]
    pub url: String,

    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

/// Diagnostics event log configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct LoggingConfig {
    /// Directory for daily log files (empty: stdout only)
    #[serde(default)]
    pub file_dir: String,
}

// Default value functions
fn default_poll_interval_ms() -> u64 { 50 }
fn default_roster_interval_ms() -> u64 { 2000 }

fn default_storage_path() -> String { "./gamepad-mappings.json".to_string() }

fn default_relay_enabled() -> bool { true }
fn default_relay_url() -> String { "ws://127.0.0.1:3001/ws".to_string() }
fn default_send_interval_ms() -> u64 { 50 }
fn default_ping_interval_ms() -> u64 { 500 }
fn default_reconnect_interval_ms() -> u64 { 2000 }

fn default_event_log_capacity() -> usize { 200 }

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            roster_interval_ms: default_roster_interval_ms(),
            preferred: String::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: default_relay_enabled(),
            url: default_relay_url(),
            send_interval_ms: default_send_interval_ms(),
            ping_interval_ms: default_ping_interval_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            event_log_capacity: default_event_log_capacity(),
        }
    }
}

impl RemapConfig {
    /// Remap timeout, `None` when disabled.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

fn invalid(message: &str) -> RelayPilotError {
    RelayPilotError::Config(toml::de::Error::custom(message))
}

fn check_range(name: &str, value: u64, max: u64) -> Result<()> {
    if value == 0 || value > max {
        return Err(invalid(&format!("{} must be between 1 and {}", name, max)));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use relay_pilot::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        check_range("poll_interval_ms", self.device.poll_interval_ms, 1000)?;
        check_range("roster_interval_ms", self.device.roster_interval_ms, 60000)?;

        if self.remap.timeout_ms > 600_000 {
            return Err(invalid("remap timeout_ms must be at most 600000"));
        }

        if self.storage.path.is_empty() {
            return Err(invalid("storage path cannot be empty"));
        }

        // Relay URL only matters when the relay is used
        if self.relay.enabled && !(self.relay.url.starts_with("ws://") || self.relay.url.starts_with("wss://")) {
            return Err(invalid("relay url must start with ws:// or wss://"));
        }

        check_range("send_interval_ms", self.relay.send_interval_ms, 1000)?;
        check_range("ping_interval_ms", self.relay.ping_interval_ms, 60000)?;
        check_range("reconnect_interval_ms", self.relay.reconnect_interval_ms, 60000)?;

        if self.diagnostics.event_log_capacity == 0 {
            return Err(invalid("event_log_capacity must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.device.poll_interval_ms, 50);
        assert_eq!(config.device.roster_interval_ms, 2000);
        assert!(config.device.preferred.is_empty());
        assert_eq!(config.remap.timeout(), None);
        assert_eq!(config.storage.path, "./gamepad-mappings.json");
        assert!(config.relay.enabled);
        assert_eq!(config.relay.url, "ws://127.0.0.1:3001/ws");
        assert_eq!(config.relay.send_interval_ms, 50);
        assert_eq!(config.relay.ping_interval_ms, 500);
        assert_eq!(config.diagnostics.event_log_capacity, 200);
        assert!(config.logging.file_dir.is_empty());
    }

    #[test]
    fn test_empty_file_equals_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
[device]
preferred = "DualSense"

[remap]
timeout_ms = 15000

[relay]
enabled = false
url = ""
"#,
        )
        .unwrap();

        assert_eq!(config.device.preferred, "DualSense");
        assert_eq!(config.device.poll_interval_ms, 50);
        assert_eq!(config.remap.timeout(), Some(Duration::from_secs(15)));
        assert!(!config.relay.enabled);
        assert_eq!(config.relay.ping_interval_ms, 500);
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[storage]
path = "/var/lib/relay-pilot/mappings.json"

[logging]
file_dir = "./logs"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.storage.path, "/var/lib/relay-pilot/mappings.json");
        assert_eq!(config.logging.file_dir, "./logs");
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/relay-pilot.toml");
        assert!(matches!(result, Err(RelayPilotError::Io(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::parse("[device\npoll_interval_ms = 50");
        assert!(matches!(result, Err(RelayPilotError::Config(_))));
    }

    #[test]
    fn test_poll_interval_zero() {
        let mut config = Config::default();
        config.device.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_poll_interval_too_high() {
        let mut config = Config::default();
        config.device.poll_interval_ms = 1001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roster_interval_too_high() {
        let mut config = Config::default();
        config.device.roster_interval_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_remap_timeout_too_high() {
        let mut config = Config::default();
        config.remap.timeout_ms = 600_001;
        assert!(config.validate().is_err());
        config.remap.timeout_ms = 600_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_storage_path() {
        let mut config = Config::default();
        config.storage.path = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relay_url_scheme() {
        let mut config = Config::default();
        config.relay.url = "http://127.0.0.1:3001/ws".to_string();
        assert!(config.validate().is_err());

        config.relay.url = "wss://relay.example.com/ws".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_relay_url_ignored_when_disabled() {
        let mut config = Config::default();
        config.relay.enabled = false;
        config.relay.url = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_send_interval_zero() {
        let mut config = Config::default();
        config.relay.send_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ping_interval_too_high() {
        let mut config = Config::default();
        config.relay.ping_interval_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reconnect_interval_zero() {
        let mut config = Config::default();
        config.relay.reconnect_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_event_log_capacity_zero() {
        let mut config = Config::default();
        config.diagnostics.event_log_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_error_message_names_field() {
        let mut config = Config::default();
        config.relay.ping_interval_ms = 0;
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("ping_interval_ms"), "{}", message);
    }
}
