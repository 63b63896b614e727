//! Common error types used across the workspace.
//!
//! None of these errors is fatal to the controller: the control loop logs
//! them and retries on the next tick. Each layer defines its own typed
//! errors and converts into [`ControllerError`] or [`TransportError`] at
//! port boundaries.

use std::time::Duration;

use crate::hub::HubAddress;

/// Boxed error used to carry adapter-specific failures across ports.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures reported by the controller core.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// No matching advertisement within the scan window.
    #[error("no advertisement from {address} within the scan window")]
    DiscoveryTimeout { address: HubAddress },

    /// A connect attempt (or the watchdog write that completes it) failed.
    #[error("connection to {address} failed")]
    ConnectionFailed {
        address: HubAddress,
        #[source]
        source: TransportError,
    },

    /// A previously connected hub stopped responding.
    #[error("connection to {address} lost")]
    ConnectionLost { address: HubAddress },

    /// The outbound queue is at capacity; the message was dropped.
    #[error("outbound queue full ({capacity} messages)")]
    QueueFull { capacity: usize },

    /// The consumer side of the outbound queue is gone.
    #[error("outbound queue closed")]
    QueueClosed,

    /// Another hub holds the scanner.
    #[error("scanner busy with {busy_with}")]
    ScanUnavailable { busy_with: HubAddress },

    /// A transport operation outside the connect/drive cycle failed.
    #[error("transport error")]
    Transport(#[from] TransportError),

    /// Invalid configuration or domain value.
    #[error("validation error")]
    Validation(#[from] ValidationError),
}

/// Failures returned by transport ports (BLE central, broker).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The operation did not complete within its time bound.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The adapter reported a failure.
    #[error("adapter failure")]
    Adapter(#[source] BoxError),
}

/// Domain invariant violations, raised while building hubs from
/// configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Hub name must not be empty.
    #[error("hub name must not be empty")]
    EmptyHubName,

    /// The string is not a `xx:xx:xx:xx:xx:xx` hardware address.
    #[error("invalid hub address {0:?}")]
    InvalidAddress(String),

    /// Two configured hubs share an address.
    #[error("hub address {0} configured more than once")]
    DuplicateHub(HubAddress),

    /// The outbound queue needs room for at least one message.
    #[error("queue capacity must be non-zero")]
    ZeroQueueCapacity,

    /// The outbound queue would be larger than the channel can allocate.
    #[error("queue capacity must be at most {max}")]
    QueueCapacityTooLarge { max: usize },
}
