//! MQTT adapter error types.

use brickdrive_domain::error::TransportError;

/// Errors specific to the MQTT adapter.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    /// The rumqttc client rejected the request.
    #[error("MQTT client error")]
    Client(#[from] rumqttc::ClientError),
}

impl MqttError {
    /// Convert into a [`TransportError`] for propagation across port
    /// boundaries.
    #[must_use]
    pub fn into_transport(self) -> TransportError {
        TransportError::Adapter(Box::new(self))
    }
}

impl From<MqttError> for TransportError {
    fn from(err: MqttError) -> Self {
        err.into_transport()
    }
}
