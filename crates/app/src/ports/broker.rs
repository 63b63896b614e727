//! Broker port for best-effort publishing of outbound messages.

use std::future::Future;

use brickdrive_domain::error::TransportError;

/// Publishes payloads to a message broker.
///
/// Only the outbound drain task calls this, so implementations may take
/// their time; the control loop never waits on a publish.
pub trait BrokerPublisher: Send + Sync + 'static {
    /// Publish `payload` on `topic`.
    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
