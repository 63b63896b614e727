//! SBrick remote-control command encoding.
//!
//! Pure functions producing the byte payloads written to the hub's
//! remote-control characteristic. No BLE dependency needed.
//!
//! | Command | Opcode | Arguments |
//! |---------|--------|-----------|
//! | Brake | `0x00` | channel indices |
//! | Drive | `0x01` | `(channel, direction, power)` per channel |
//! | Set watchdog timeout | `0x0D` | timeout in 0.1 s units |

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::drive::{CHANNEL_COUNT, DriveCommand, WatchdogTimeout};

/// GATT characteristic identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacteristicId(uuid::Uuid);

impl CharacteristicId {
    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Access the inner UUID.
    #[must_use]
    pub const fn as_uuid(self) -> uuid::Uuid {
        self.0
    }
}

impl fmt::Display for CharacteristicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// GATT service exposing the remote-control characteristics.
pub const REMOTE_CONTROL_SERVICE: uuid::Uuid =
    uuid::Uuid::from_u128(0x4dc5_91b0_857c_41de_b5f1_15ab_da66_5b0c);

/// Characteristic accepting remote-control commands.
pub const REMOTE_CONTROL_COMMANDS: CharacteristicId =
    CharacteristicId::from_uuid(uuid::Uuid::from_u128(0x02b8_cbcc_0e25_4bda_8790_a15f_53e6_010f));

const OP_BRAKE: u8 = 0x00;
const OP_DRIVE: u8 = 0x01;
const OP_SET_WATCHDOG: u8 = 0x0D;

const CLOCKWISE: u8 = 0x00;
const COUNTER_CLOCKWISE: u8 = 0x01;

/// A command understood by the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubCommand {
    /// Drive all channels; negative magnitudes turn counter-clockwise.
    Drive(DriveCommand),
    /// Actively brake all channels.
    Brake,
    /// Store the watchdog timeout in the hub's persistent store.
    SetWatchdogTimeout(WatchdogTimeout),
}

impl HubCommand {
    /// Characteristic this command is written to.
    #[must_use]
    pub const fn characteristic(&self) -> CharacteristicId {
        REMOTE_CONTROL_COMMANDS
    }

    /// Encode into the on-wire payload.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Drive(drive) => encode_drive(drive),
            Self::Brake => {
                let mut bytes = Vec::with_capacity(1 + CHANNEL_COUNT);
                bytes.push(OP_BRAKE);
                bytes.extend(channel_indices());
                bytes
            }
            Self::SetWatchdogTimeout(timeout) => vec![OP_SET_WATCHDOG, timeout.tenths()],
        }
    }
}

fn encode_drive(drive: &DriveCommand) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(1 + 3 * CHANNEL_COUNT);
    bytes.push(OP_DRIVE);
    for (channel, power) in channel_indices().zip(drive.channels()) {
        let direction = if power < 0 { COUNTER_CLOCKWISE } else { CLOCKWISE };
        // `DriveCommand` keeps magnitudes within 0..=255.
        let magnitude = u8::try_from(power.unsigned_abs()).unwrap_or(u8::MAX);
        bytes.extend([channel, direction, magnitude]);
    }
    bytes
}

fn channel_indices() -> impl Iterator<Item = u8> {
    (0u8..).take(CHANNEL_COUNT)
}
