//! BLE adapter error types.

use brickdrive_domain::error::TransportError;

/// Errors specific to the BLE adapter.
#[derive(Debug, thiserror::Error)]
pub enum BleError {
    /// No BLE adapter found on the host.
    #[error("no BLE adapter available")]
    NotAvailable,

    /// BLE scan or adapter operation failed.
    #[error("BLE adapter error")]
    Scan(#[from] btleplug::Error),

    /// Opening the GATT connection failed.
    #[error("failed to connect to peripheral")]
    GattConnect(#[source] btleplug::Error),

    /// The connected hub does not expose the expected characteristic.
    #[error("characteristic {uuid} not found")]
    CharacteristicNotFound {
        /// The UUID that was looked up.
        uuid: uuid::Uuid,
    },
}

impl BleError {
    /// Convert into a [`TransportError`] for propagation across port
    /// boundaries.
    #[must_use]
    pub fn into_transport(self) -> TransportError {
        TransportError::Adapter(Box::new(self))
    }
}

impl From<BleError> for TransportError {
    fn from(err: BleError) -> Self {
        err.into_transport()
    }
}
