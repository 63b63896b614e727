//! Hub registry and the periodic control loop.
//!
//! The registry owns every [`HubConnection`] in configuration order plus the
//! shared [`DiscoveryScanner`]. One sweep ticks each hub exactly once, then
//! enqueues a status report when publishing is enabled. Sweeps are spaced by
//! a fixed delay so drive writes do not flood the radio.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use brickdrive_domain::error::{ControllerError, ValidationError};
use brickdrive_domain::hub::{ensure_unique, HubAddress, HubSpec};
use brickdrive_domain::status::{HubStatus, StatusReport};

use crate::connection::{HubConnection, LinkSettings};
use crate::outbound::{OutboundMessage, OutboundQueue};
use crate::ports::BleCentral;
use crate::scanner::DiscoveryScanner;

/// Controller-wide settings, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Controller type identifier reported in status messages.
    pub controller_type: String,
    /// Pause between two sweeps.
    pub inter_tick_delay: Duration,
    /// Length of one discovery scan.
    pub scan_duration: Duration,
    pub link: LinkSettings,
    /// Topic status reports are published on.
    pub status_topic: String,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            controller_type: "MTC4SB".to_string(),
            inter_tick_delay: Duration::from_secs(5),
            scan_duration: Duration::from_secs(1),
            link: LinkSettings::default(),
            status_topic: "roc2bricks/status".to_string(),
        }
    }
}

/// Owner of the hub collection and the shared scanner.
pub struct HubRegistry<B: BleCentral> {
    settings: ControllerSettings,
    hubs: Vec<HubConnection<B>>,
    scanner: DiscoveryScanner<B>,
    outbound: Option<OutboundQueue>,
    started: Instant,
}

impl<B: BleCentral> HubRegistry<B> {
    /// Build the registry from the configured hubs, in order.
    ///
    /// Pass `outbound` only when status publishing is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if a hub spec is invalid or two hubs share
    /// an address.
    pub fn new(
        settings: ControllerSettings,
        specs: Vec<HubSpec>,
        central: Arc<B>,
        outbound: Option<OutboundQueue>,
    ) -> Result<Self, ValidationError> {
        for spec in &specs {
            spec.validate()?;
        }
        ensure_unique(&specs)?;

        let scanner = DiscoveryScanner::new(Arc::clone(&central), settings.scan_duration);
        let hubs = specs
            .into_iter()
            .map(|spec| HubConnection::new(spec, Arc::clone(&central), settings.link))
            .collect();

        Ok(Self {
            settings,
            hubs,
            scanner,
            outbound,
            started: Instant::now(),
        })
    }

    #[must_use]
    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Hubs in configuration order.
    #[must_use]
    pub fn hubs(&self) -> &[HubConnection<B>] {
        &self.hubs
    }

    #[must_use]
    pub fn hub(&self, address: HubAddress) -> Option<&HubConnection<B>> {
        self.hubs.iter().find(|hub| hub.address() == address)
    }

    /// Mutable access to one hub, e.g. to change its drive.
    pub fn hub_mut(&mut self, address: HubAddress) -> Option<&mut HubConnection<B>> {
        self.hubs.iter_mut().find(|hub| hub.address() == address)
    }

    /// Run one sweep: tick every hub once, then enqueue a status report.
    pub async fn tick(&mut self) {
        for hub in &mut self.hubs {
            match hub.tick(&self.scanner).await {
                Ok(state) => tracing::trace!(hub = %hub.name(), %state, "hub ticked"),
                Err(
                    err @ (ControllerError::ScanUnavailable { .. }
                    | ControllerError::DiscoveryTimeout { .. }),
                ) => {
                    tracing::debug!(%err, hub = %hub.name(), state = %hub.state(), "discovery pending");
                }
                Err(err) => {
                    tracing::warn!(%err, hub = %hub.name(), state = %hub.state(), "hub tick failed");
                }
            }
        }

        self.publish_status();
    }

    /// Snapshot of every hub's state.
    #[must_use]
    pub fn status_report(&self) -> StatusReport {
        StatusReport {
            controller: self.settings.controller_type.clone(),
            timestamp: brickdrive_domain::time::now(),
            uptime_ms: brickdrive_domain::time::as_millis(self.started.elapsed()),
            hubs: self
                .hubs
                .iter()
                .map(|hub| HubStatus {
                    name: hub.name().to_string(),
                    address: hub.address(),
                    state: hub.state(),
                })
                .collect(),
        }
    }

    /// Sweep, then wait the inter-tick delay, until `shutdown` resolves.
    /// A sweep in progress always completes; the hubs are released
    /// afterwards.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            hubs = self.hubs.len(),
            delay = ?self.settings.inter_tick_delay,
            publishing = self.outbound.is_some(),
            "control loop started"
        );

        tokio::pin!(shutdown);
        loop {
            self.tick().await;
            tokio::select! {
                () = &mut shutdown => break,
                () = tokio::time::sleep(self.settings.inter_tick_delay) => {}
            }
        }

        tracing::info!("control loop stopping");
        self.shutdown().await;
    }

    /// Brake and disconnect every hub.
    pub async fn shutdown(&mut self) {
        for hub in &mut self.hubs {
            hub.release().await;
        }
    }

    fn publish_status(&self) {
        let Some(outbound) = &self.outbound else {
            return;
        };

        let report = self.status_report();
        let payload = match report.to_json() {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(%err, "failed to serialise status report");
                return;
            }
        };

        let message = OutboundMessage::new(self.settings.status_topic.clone(), payload);
        if let Err(err) = outbound.enqueue(message) {
            tracing::warn!(%err, queued = outbound.len(), "status message dropped");
        }
    }
}
