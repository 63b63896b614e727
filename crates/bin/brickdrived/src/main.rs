//! # brickdrived — brickdrive daemon
//!
//! Composition root that wires all adapters together and runs the control
//! loop.
//!
//! ## Responsibilities
//! - Load configuration (config file, env vars)
//! - Initialise `tracing` logging
//! - Open the host BLE adapter
//! - When publishing is enabled, connect to the MQTT broker and start the
//!   outbound drain task
//! - Build the hub registry and run it until SIGINT
//! - On shutdown, brake and disconnect every hub, then flush the queue
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use brickdrive_adapter_ble::BtleplugCentral;
use brickdrive_adapter_mqtt::MqttBroker;
use brickdrive_app::control_loop::HubRegistry;
use brickdrive_app::outbound;

use crate::config::Config;

/// Time granted to the drain task to flush queued messages on shutdown.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter)?)
        .init();

    let specs = config.hub_specs()?;
    tracing::info!(
        controller = %config.controller.controller_type,
        hubs = specs.len(),
        "starting brickdrived"
    );

    // BLE
    let central = Arc::new(BtleplugCentral::first_adapter().await?);

    // MQTT
    let mut publishing = None;
    let queue = if config.mqtt.enabled {
        let (queue, drain) = outbound::bounded(config.mqtt.queue_capacity)?;
        let (broker, mqtt_task) = MqttBroker::start(&config.mqtt);
        let publisher_task = outbound::spawn_publisher(drain, broker);
        publishing = Some((publisher_task, mqtt_task));
        Some(queue)
    } else {
        tracing::info!("status publishing disabled");
        None
    };

    // Control loop
    let mut registry = HubRegistry::new(config.controller_settings(), specs, central, queue)?;

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown signal received"),
            Err(err) => {
                tracing::warn!(%err, "cannot listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        }
        let _ = stop_tx.send(());
    });

    registry
        .run_until(async move {
            let _ = stop_rx.await;
        })
        .await;

    // Dropping the registry closes the queue so the drain task can finish.
    drop(registry);
    if let Some((publisher_task, mqtt_task)) = publishing {
        if tokio::time::timeout(FLUSH_TIMEOUT, publisher_task).await.is_err() {
            tracing::warn!("outbound queue not flushed before shutdown");
        }
        mqtt_task.abort();
    }

    tracing::info!("brickdrived stopped");
    Ok(())
}
