//! # brickdrive-adapter-mqtt
//!
//! MQTT adapter: implements the `BrokerPublisher` port on top of `rumqttc`.
//!
//! ## Responsibilities
//! - Connect to the broker with a short keep-alive and a retained
//!   `offline` last will on `<status_topic>/availability`
//! - Announce `online` on the same topic after every (re)connect
//! - Subscribe to the command topic and log whatever arrives
//! - Publish status messages handed over by the outbound drain task
//!
//! Nothing here waits on the request channel: while the broker is away the
//! channel fills up and further requests are rejected instead of blocking
//! the caller or the event loop task.
//!
//! ## Dependency rule
//! Same as other adapters: depends on `brickdrive-app` and
//! `brickdrive-domain`.

mod config;
mod error;

pub use config::MqttConfig;
pub use error::MqttError;

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;

use brickdrive_app::ports::BrokerPublisher;
use brickdrive_domain::error::TransportError;

/// Retained payload marking the controller as reachable.
pub const ONLINE: &str = "online";

/// Retained last-will payload sent by the broker when the controller drops.
pub const OFFLINE: &str = "offline";

/// Capacity of the request channel between the client and its event loop.
/// Publishing fails once this many requests wait for a broker.
const REQUEST_CAPACITY: usize = 64;

/// Pause before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Broker connection used by the outbound drain task.
#[derive(Clone)]
pub struct MqttBroker {
    client: AsyncClient,
}

impl MqttBroker {
    /// Create the client and spawn the task driving its event loop.
    ///
    /// The connection is established lazily by the event loop task, which
    /// also reconnects after failures.
    #[must_use]
    pub fn start(config: &MqttConfig) -> (Self, JoinHandle<()>) {
        let (client, eventloop) = AsyncClient::new(options(config), REQUEST_CAPACITY);

        tracing::info!(
            host = %config.broker_host,
            port = config.broker_port,
            client_id = %config.client_id,
            "MQTT client started"
        );

        let handle = tokio::spawn(drive_event_loop(
            client.clone(),
            eventloop,
            config.availability_topic(),
            config.command_topic.clone(),
        ));

        (Self { client }, handle)
    }

    fn publish_inner(&self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())?;
        Ok(())
    }
}

impl BrokerPublisher for MqttBroker {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        Ok(self.publish_inner(topic, payload)?)
    }
}

fn options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(
        config.client_id.clone(),
        config.broker_host.clone(),
        config.broker_port,
    );
    options
        .set_keep_alive(config.keep_alive())
        .set_last_will(LastWill::new(
            config.availability_topic(),
            OFFLINE,
            QoS::AtLeastOnce,
            true,
        ));
    options
}

async fn drive_event_loop(
    client: AsyncClient,
    mut eventloop: EventLoop,
    availability_topic: String,
    command_topic: String,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("connected to MQTT broker");
                // Only this task drains the request channel, so never wait on it.
                if let Err(err) = client.try_subscribe(command_topic.clone(), QoS::AtMostOnce) {
                    tracing::warn!(%err, topic = %command_topic, "MQTT subscribe failed");
                }
                if let Err(err) =
                    client.try_publish(availability_topic.clone(), QoS::AtLeastOnce, true, ONLINE)
                {
                    tracing::warn!(%err, topic = %availability_topic, "MQTT online announcement failed");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                tracing::info!(
                    topic = %publish.topic,
                    payload = %String::from_utf8_lossy(&publish.payload),
                    "MQTT message received"
                );
            }
            Ok(event) => tracing::trace!(?event, "MQTT event"),
            Err(err) => {
                tracing::warn!(%err, "MQTT connection error, retrying");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}
