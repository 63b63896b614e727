//! Drive values and the hub-side watchdog timeout.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of independently driven channels on a hub.
pub const CHANNEL_COUNT: usize = 4;

/// Largest magnitude a channel accepts in either direction.
pub const MAX_POWER: i16 = 255;

/// Signed drive magnitudes for all four channels.
///
/// The sign encodes direction. Out-of-range input is clamped to
/// `±`[`MAX_POWER`], never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct DriveCommand([i16; CHANNEL_COUNT]);

impl DriveCommand {
    /// All channels stopped.
    pub const STOP: Self = Self([0; CHANNEL_COUNT]);

    /// Build a command, clamping every channel into `-255..=255`.
    #[must_use]
    pub fn new(channels: [i32; CHANNEL_COUNT]) -> Self {
        Self(channels.map(clamp))
    }

    /// Per-channel magnitudes, in channel order.
    #[must_use]
    pub const fn channels(&self) -> [i16; CHANNEL_COUNT] {
        self.0
    }

    /// Whether every channel is at zero.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.iter().all(|power| *power == 0)
    }
}

impl From<[i32; CHANNEL_COUNT]> for DriveCommand {
    fn from(channels: [i32; CHANNEL_COUNT]) -> Self {
        Self::new(channels)
    }
}

impl From<DriveCommand> for [i32; CHANNEL_COUNT] {
    fn from(command: DriveCommand) -> Self {
        command.0.map(i32::from)
    }
}

fn clamp(value: i32) -> i16 {
    let max = i32::from(MAX_POWER);
    i16::try_from(value.clamp(-max, max)).unwrap_or(MAX_POWER)
}

/// Hub-side watchdog timeout, in tenths of a second. Zero disables it.
///
/// The hub arms the watchdog on the first non-zero drive and stops every
/// channel if no further drive arrives within the timeout. The value lives
/// in the hub's persistent store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WatchdogTimeout(u8);

impl WatchdogTimeout {
    /// Watchdog switched off.
    pub const DISABLED: Self = Self(0);

    #[must_use]
    pub const fn from_tenths(tenths: u8) -> Self {
        Self(tenths)
    }

    #[must_use]
    pub const fn tenths(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn is_disabled(self) -> bool {
        self.0 == 0
    }

    /// The timeout as a wall-clock duration.
    #[must_use]
    pub fn as_duration(self) -> Duration {
        Duration::from_millis(u64::from(self.0) * 100)
    }
}

impl Default for WatchdogTimeout {
    /// Two seconds.
    fn default() -> Self {
        Self(20)
    }
}
