//! Configuration management.
//!
//! TOML-backed configuration with sensible defaults. Sections:
//!
//! - [`DeviceSettings`] - how to reach the sensor (BLE name filter, serial port)
//! - [`SessionSettings`] - protocol timing knobs
//! - [`LoggingSettings`] - log level and optional file
//!
//! The inter-command gap is a device constraint: the sensor firmware drops or
//! corrupts commands arriving closer than 350 ms apart. The configured value
//! can only raise that gap, never lower it (see [`SessionSettings::command_gap`]).

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

/// Hard lower bound for the inter-command gap, in milliseconds.
pub const MIN_COMMAND_GAP_MS: u64 = 350;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub device: DeviceSettings,
    pub session: SessionSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// BLE advertised name to connect to (16 hex digits). Empty = first
    /// peripheral that passes the name check.
    pub name: String,
    /// Serial port for the bench console transport.
    pub serial_port: String,
    pub baud_rate: u32,
    /// Seconds to scan before giving up on BLE discovery.
    pub scan_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Minimum spacing between outgoing commands, in milliseconds.
    pub command_gap_ms: u64,
    /// Delay after connect before the first telemetry/config queries.
    pub settle_delay_ms: u64,
    /// Delay after connect before the LoRa and NB-IoT query batches.
    pub radio_query_delay_ms: u64,
    /// Idle telemetry poll interval, in seconds.
    pub poll_interval_secs: u64,
    pub calibrate_timeout_secs: u64,
    pub reboot_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub file: Option<String>,
}

impl SessionSettings {
    /// Effective inter-command gap: configured value clamped to the firmware
    /// floor.
    pub fn command_gap(&self) -> Duration {
        Duration::from_millis(self.command_gap_ms.max(MIN_COMMAND_GAP_MS))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn radio_query_delay(&self) -> Duration {
        Duration::from_millis(self.radio_query_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn calibrate_timeout(&self) -> Duration {
        Duration::from_secs(self.calibrate_timeout_secs)
    }

    pub fn reboot_timeout(&self) -> Duration {
        Duration::from_secs(self.reboot_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !self.device.name.is_empty() && !crate::validation::is_valid_device_name(&self.device.name) {
            return Err(anyhow!(
                "device.name must be empty or a 16-hex-digit sensor serial, got '{}'",
                self.device.name
            ));
        }
        if self.session.poll_interval_secs == 0 {
            return Err(anyhow!("session.poll_interval_secs must be at least 1"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device: DeviceSettings {
                name: String::new(),
                serial_port: "/dev/ttyUSB0".to_string(),
                baud_rate: 115200,
                scan_timeout_secs: 15,
            },
            session: SessionSettings {
                command_gap_ms: MIN_COMMAND_GAP_MS,
                settle_delay_ms: 500,
                radio_query_delay_ms: 2000,
                poll_interval_secs: 10,
                calibrate_timeout_secs: 30,
                reboot_timeout_secs: 15,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                file: Some("swiott.log".to_string()),
            },
        }
    }
}
