//! BLE adapter configuration.

use std::time::Duration;

use serde::Deserialize;

/// Timing of scans and hub connections.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// Length of one discovery scan, in seconds.
    pub scan_duration_secs: u16,
    /// Upper bound for opening a connection to a hub, in seconds.
    pub connect_timeout_secs: u16,
    /// Upper bound for a single characteristic write, in seconds.
    pub command_timeout_secs: u16,
}

impl BleConfig {
    #[must_use]
    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.scan_duration_secs))
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.connect_timeout_secs))
    }

    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.command_timeout_secs))
    }
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            scan_duration_secs: 1,
            connect_timeout_secs: 10,
            command_timeout_secs: 2,
        }
    }
}
