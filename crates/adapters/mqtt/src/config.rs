//! MQTT adapter configuration.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for status publishing over MQTT.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Publish status messages at all.
    pub enabled: bool,
    /// Messages buffered between the control loop and the broker.
    pub queue_capacity: usize,
    /// MQTT broker hostname or IP address.
    pub broker_host: String,
    /// MQTT broker port.
    pub broker_port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// Topic status reports are published on.
    pub status_topic: String,
    /// Topic whose messages are logged on arrival.
    pub command_topic: String,
}

impl MqttConfig {
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(u64::from(self.keep_alive_secs))
    }

    /// Retained `online`/`offline` topic, kept apart from the JSON reports.
    #[must_use]
    pub fn availability_topic(&self) -> String {
        format!("{}/availability", self.status_topic)
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            queue_capacity: 1000,
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "brickdrive".to_string(),
            keep_alive_secs: 5,
            status_topic: "roc2bricks/status".to_string(),
            command_topic: "rocrail/service/command".to_string(),
        }
    }
}
