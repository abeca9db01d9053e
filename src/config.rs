//! Configuration for the thermolink daemon
//!
//! Loads configuration from a TOML file. Every section has working
//! defaults, so a partial file (or none at all) still yields a usable
//! configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub protocol: ProtocolConfig,
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port to open at startup; empty means auto-select the first scanned port
    pub port: String,
    /// Line rate; the firmware ships at 115200
    pub baudrate: u32,
    /// Per-read timeout on the port handle
    pub read_timeout_ms: u64,
    /// Wait after opening before first use; boards reset on DTR toggle
    pub settle_delay_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baudrate: 115_200,
            read_timeout_ms: 100,
            settle_delay_ms: 500,
        }
    }
}

/// Command/response exchange tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Budget for one exchange attempt
    pub response_timeout_ms: u64,
    /// Attempts per exchange; absorbs device boot latency
    pub retry_attempts: u32,
    /// Pause between attempts
    pub retry_backoff_ms: u64,
    /// Let the reader digest buffered input before each command write
    pub drain_before_send: bool,
    /// Upper bound on the pre-send quiescence wait
    pub drain_budget_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 2_000,
            retry_attempts: 3,
            retry_backoff_ms: 300,
            drain_before_send: true,
            drain_budget_ms: 200,
        }
    }
}

/// Telemetry retention and health tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Bounded queue between the reader and a polling consumer
    pub queue_capacity: usize,
    /// Recent-readings ring size
    pub history_capacity: usize,
    /// Sensors silent for longer are dropped from the table
    pub stale_after_ms: u64,
    /// Data younger than this counts as a healthy connection
    pub health_window_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            history_capacity: 1_000,
            stale_after_ms: 10_000,
            health_window_ms: 10_000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log output (stdout, stderr, or file path)
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: "stdout".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    ///
    /// # Example
    /// ```no_run
    /// use thermolink::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("thermolink.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| Error::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.serial.baudrate, 115_200);
        assert_eq!(config.serial.settle_delay_ms, 500);
        assert_eq!(config.protocol.retry_attempts, 3);
        assert!(config.protocol.drain_before_send);
        assert_eq!(config.telemetry.history_capacity, 1_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        // Should contain all sections
        assert!(toml_string.contains("[serial]"));
        assert!(toml_string.contains("[protocol]"));
        assert!(toml_string.contains("[telemetry]"));
        assert!(toml_string.contains("[logging]"));

        // Should contain key values
        assert!(toml_string.contains("baudrate = 115200"));
        assert!(toml_string.contains("retry_attempts = 3"));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[serial]
port = "/dev/ttyUSB0"
baudrate = 57600
read_timeout_ms = 50
settle_delay_ms = 250

[protocol]
response_timeout_ms = 1500
retry_attempts = 5
retry_backoff_ms = 100
drain_before_send = false
drain_budget_ms = 200

[telemetry]
queue_capacity = 64
history_capacity = 500
stale_after_ms = 5000
health_window_ms = 5000

[logging]
level = "debug"
output = "stdout"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baudrate, 57600);
        assert_eq!(config.protocol.retry_attempts, 5);
        assert!(!config.protocol.drain_before_send);
        assert_eq!(config.telemetry.stale_after_ms, 5000);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str("[serial]\nport = \"/dev/ttyACM0\"\n").unwrap();
        assert_eq!(config.serial.port, "/dev/ttyACM0");
        assert_eq!(config.serial.baudrate, 115_200);
        assert_eq!(config.protocol.response_timeout_ms, 2_000);
    }
}
