//! Bounded outbound queue backed by a tokio [`mpsc`] channel.
//!
//! The control loop enqueues status messages without ever waiting; when the
//! queue is full the new message is rejected and dropped. A separate task
//! drains the queue into a [`BrokerPublisher`] at its own pace.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::task::JoinHandle;

use brickdrive_domain::error::{ControllerError, ValidationError};

use crate::ports::BrokerPublisher;

/// Default number of messages the queue holds before dropping.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Largest accepted capacity.
pub const MAX_CAPACITY: usize = 1 << 20;

/// An opaque message awaiting publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
}

impl OutboundMessage {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Producer side of the queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    sender: mpsc::Sender<OutboundMessage>,
}

/// Consumer side of the queue.
#[derive(Debug)]
pub struct OutboundDrain {
    receiver: mpsc::Receiver<OutboundMessage>,
}

/// Create a queue holding at most `capacity` messages.
///
/// # Errors
///
/// Returns [`ValidationError::ZeroQueueCapacity`] when `capacity` is zero,
/// or [`ValidationError::QueueCapacityTooLarge`] above [`MAX_CAPACITY`].
pub fn bounded(capacity: usize) -> Result<(OutboundQueue, OutboundDrain), ValidationError> {
    check_capacity(capacity)?;
    let (sender, receiver) = mpsc::channel(capacity);
    Ok((OutboundQueue { sender }, OutboundDrain { receiver }))
}

/// Check that `capacity` is usable for [`bounded`].
///
/// # Errors
///
/// Same as [`bounded`].
pub fn check_capacity(capacity: usize) -> Result<(), ValidationError> {
    match capacity {
        0 => Err(ValidationError::ZeroQueueCapacity),
        c if c > MAX_CAPACITY => Err(ValidationError::QueueCapacityTooLarge { max: MAX_CAPACITY }),
        _ => Ok(()),
    }
}

impl OutboundQueue {
    /// Append a message without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::QueueFull`] when the queue is at capacity
    /// (the message is dropped, nothing is evicted), or
    /// [`ControllerError::QueueClosed`] when the drain is gone.
    pub fn enqueue(&self, message: OutboundMessage) -> Result<(), ControllerError> {
        self.sender.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => ControllerError::QueueFull {
                capacity: self.capacity(),
            },
            TrySendError::Closed(_) => ControllerError::QueueClosed,
        })
    }

    /// Messages currently waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }
}

impl OutboundDrain {
    /// Take the oldest message, if any, without waiting.
    pub fn dequeue(&mut self) -> Option<OutboundMessage> {
        match self.receiver.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Wait for the next message. Returns `None` once every producer is gone
    /// and the queue is empty.
    pub async fn recv(&mut self) -> Option<OutboundMessage> {
        self.receiver.recv().await
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

/// Spawn the best-effort publisher: every message is published once and
/// discarded, whether or not the broker accepted it.
pub fn spawn_publisher<P: BrokerPublisher>(mut drain: OutboundDrain, publisher: P) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = drain.recv().await {
            match publisher
                .publish(&message.topic, message.payload.as_bytes())
                .await
            {
                Ok(()) => tracing::trace!(topic = %message.topic, "message published"),
                Err(err) => {
                    tracing::warn!(%err, topic = %message.topic, "publish failed, message dropped");
                }
            }
        }
        tracing::debug!("outbound queue closed, publisher stopped");
    })
}
