//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `brickdrive.toml` in the working directory, or at the path in
//! `BRICKDRIVE_CONFIG`. Every field has a default so the file is optional.
//! Environment variables take precedence over file values.

use std::time::Duration;

use serde::Deserialize;

use brickdrive_adapter_ble::BleConfig;
use brickdrive_adapter_mqtt::MqttConfig;
use brickdrive_app::connection::LinkSettings;
use brickdrive_app::control_loop::ControllerSettings;
use brickdrive_app::outbound;
use brickdrive_domain::drive::{DriveCommand, WatchdogTimeout};
use brickdrive_domain::error::ValidationError;
use brickdrive_domain::hub::{ensure_unique, HubSpec};

const DEFAULT_PATH: &str = "brickdrive.toml";

/// Top-level configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Control loop settings.
    pub controller: ControllerConfig,
    /// BLE scan and connection timing.
    pub ble: BleConfig,
    /// Status publishing.
    pub mqtt: MqttConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Hubs to drive, in sweep order.
    pub hubs: Vec<HubConfig>,
}

/// Control loop configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Controller type identifier reported in status messages.
    pub controller_type: String,
    /// Pause between two sweeps, in milliseconds.
    pub tick_delay_ms: u64,
    /// Watchdog timeout written to every hub, in tenths of a second
    /// (0 disables).
    pub watchdog_tenths: u8,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// One configured hub.
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    pub name: String,
    /// Hardware address, `xx:xx:xx:xx:xx:xx`.
    pub address: String,
    /// Drive applied once connected, one signed power per channel.
    #[serde(default)]
    pub drive: Option<DriveCommand>,
}

impl Config {
    /// Load configuration from `brickdrive.toml` (or `BRICKDRIVE_CONFIG`)
    /// if present, then apply environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is malformed, or the result
    /// fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("BRICKDRIVE_CONFIG").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("BRICKDRIVE_MQTT_ENABLED") {
            match val.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.mqtt.enabled = true,
                "0" | "false" | "no" | "off" => self.mqtt.enabled = false,
                _ => {}
            }
        }
        if let Some(val) = var("BRICKDRIVE_MQTT_HOST") {
            self.mqtt.broker_host = val;
        }
        if let Some(val) = var("BRICKDRIVE_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ble.scan_duration_secs == 0 {
            return Err(ConfigError::Validation(
                "ble.scan_duration_secs must be non-zero".to_string(),
            ));
        }
        outbound::check_capacity(self.mqtt.queue_capacity)?;
        self.hub_specs()?;
        Ok(())
    }

    /// Build the hub specs, in configuration order.
    ///
    /// # Errors
    ///
    /// Returns an error when no hub is configured, a hub is malformed, or
    /// two hubs share an address.
    pub fn hub_specs(&self) -> Result<Vec<HubSpec>, ConfigError> {
        if self.hubs.is_empty() {
            return Err(ConfigError::Validation(
                "at least one hub must be configured".to_string(),
            ));
        }

        let specs = self
            .hubs
            .iter()
            .map(|hub| {
                let builder = HubSpec::builder().name(&hub.name).address(&hub.address);
                match hub.drive {
                    Some(drive) => builder.initial_drive(drive),
                    None => builder,
                }
                .build()
            })
            .collect::<Result<Vec<_>, _>>()?;
        ensure_unique(&specs)?;
        Ok(specs)
    }

    /// Settings handed to the hub registry.
    #[must_use]
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            controller_type: self.controller.controller_type.clone(),
            inter_tick_delay: Duration::from_millis(self.controller.tick_delay_ms),
            scan_duration: self.ble.scan_duration(),
            link: LinkSettings {
                watchdog: WatchdogTimeout::from_tenths(self.controller.watchdog_tenths),
                connect_timeout: self.ble.connect_timeout(),
                command_timeout: self.ble.command_timeout(),
            },
            status_topic: self.mqtt.status_topic.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let drive = Some(DriveCommand::new([-75, -75, 75, 75]));
        Self {
            controller: ControllerConfig::default(),
            ble: BleConfig::default(),
            mqtt: MqttConfig::default(),
            logging: LoggingConfig::default(),
            hubs: vec![
                HubConfig {
                    name: "YC66405".to_string(),
                    address: "00:07:80:d0:47:43".to_string(),
                    drive,
                },
                HubConfig {
                    name: "HE10233".to_string(),
                    address: "00:07:80:d0:3a:f2".to_string(),
                    drive,
                },
            ],
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            controller_type: "MTC4SB".to_string(),
            tick_delay_ms: 5000,
            watchdog_tenths: WatchdogTimeout::default().tenths(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "brickdrived=info,brickdrive=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// A hub entry violates a domain invariant.
    #[error("invalid hub configuration")]
    Hub(#[from] ValidationError),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
