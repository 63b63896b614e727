//! Hub connection state machine.
//!
//! One [`HubConnection`] per configured hub. Each call to
//! [`HubConnection::tick`] advances the machine by at most one step:
//!
//! | State | Tick does |
//! |-------|-----------|
//! | `Idle` / `Discovering` | collect this hub's scan result, or request a scan |
//! | `Discovered` | connect, write the watchdog timeout, then drive |
//! | `Connected` | check the link and write the current drive command |
//!
//! Every failure is non-fatal. The machine stays where it is (or falls back
//! to `Idle` on a lost link) and the next tick retries.

use std::sync::Arc;
use std::time::Duration;

use brickdrive_domain::command::HubCommand;
use brickdrive_domain::drive::{DriveCommand, WatchdogTimeout};
use brickdrive_domain::error::{ControllerError, TransportError};
use brickdrive_domain::hub::{HubAddress, HubSpec, HubState};

use crate::ports::BleCentral;
use crate::scanner::{DiscoveryScanner, ScanOutcome};

/// Time bounds and hub settings applied to every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    /// Written to the hub once per successful connection.
    pub watchdog: WatchdogTimeout,
    /// Upper bound for opening a connection.
    pub connect_timeout: Duration,
    /// Upper bound for a single characteristic write or liveness check.
    pub command_timeout: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            watchdog: WatchdogTimeout::default(),
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(2),
        }
    }
}

enum Phase<H, L> {
    Idle,
    Discovering,
    Discovered { handle: H },
    Connecting,
    Connected { link: L },
}

/// Connection lifecycle of a single hub.
pub struct HubConnection<B: BleCentral> {
    spec: HubSpec,
    central: Arc<B>,
    settings: LinkSettings,
    phase: Phase<B::Handle, B::Link>,
    drive: Option<DriveCommand>,
}

impl<B: BleCentral> HubConnection<B> {
    /// Create an idle connection for `spec`. The spec's initial drive, if
    /// any, becomes the current drive command.
    #[must_use]
    pub fn new(spec: HubSpec, central: Arc<B>, settings: LinkSettings) -> Self {
        let drive = spec.initial_drive;
        Self {
            spec,
            central,
            settings,
            phase: Phase::Idle,
            drive,
        }
    }

    #[must_use]
    pub fn spec(&self) -> &HubSpec {
        &self.spec
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    #[must_use]
    pub fn address(&self) -> HubAddress {
        self.spec.address
    }

    #[must_use]
    pub fn state(&self) -> HubState {
        match self.phase {
            Phase::Idle => HubState::Idle,
            Phase::Discovering => HubState::Discovering,
            Phase::Discovered { .. } => HubState::Discovered,
            Phase::Connecting => HubState::Connecting,
            Phase::Connected { .. } => HubState::Connected,
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self.phase, Phase::Connected { .. })
    }

    /// Whether the hub has been seen advertising and not lost since.
    #[must_use]
    pub fn is_discovered(&self) -> bool {
        matches!(
            self.phase,
            Phase::Discovered { .. } | Phase::Connecting | Phase::Connected { .. }
        )
    }

    /// Drive command dispatched on every tick while connected.
    #[must_use]
    pub fn drive(&self) -> Option<DriveCommand> {
        self.drive
    }

    /// Record the desired per-channel magnitudes. Values are clamped to
    /// `±255` and sent on the next tick while connected.
    pub fn set_drive(&mut self, ch0: i32, ch1: i32, ch2: i32, ch3: i32) {
        self.drive = Some(DriveCommand::new([ch0, ch1, ch2, ch3]));
    }

    /// Advance the state machine by one step.
    ///
    /// # Errors
    ///
    /// Every error is non-fatal and already reflected in [`state`](Self::state):
    /// [`ControllerError::ScanUnavailable`] and
    /// [`ControllerError::DiscoveryTimeout`] while discovering,
    /// [`ControllerError::ConnectionFailed`] while connecting,
    /// [`ControllerError::ConnectionLost`] once connected.
    #[tracing::instrument(
        name = "hub_tick",
        skip(self, scanner),
        fields(hub = %self.spec.name, address = %self.spec.address)
    )]
    pub async fn tick(&mut self, scanner: &DiscoveryScanner<B>) -> Result<HubState, ControllerError> {
        match self.phase {
            Phase::Idle | Phase::Discovering => self.discover(scanner)?,
            Phase::Discovered { .. } => self.connect().await?,
            Phase::Connecting => {
                // Only reachable when an earlier tick was dropped mid-connect;
                // the advertisement handle went with it.
                self.phase = Phase::Idle;
                self.discover(scanner)?;
            }
            Phase::Connected { .. } => self.dispatch_drive().await?,
        }
        Ok(self.state())
    }

    /// Brake and disconnect, leaving the machine `Idle`.
    pub async fn release(&mut self) {
        if let Phase::Connected { link } = &self.phase {
            let brake = HubCommand::Brake;
            if let Err(err) = self.write(link, &brake).await {
                tracing::debug!(%err, hub = %self.spec.name, "brake before disconnect failed");
            }
        }
        self.drop_link().await;
        self.phase = Phase::Idle;
    }

    fn discover(&mut self, scanner: &DiscoveryScanner<B>) -> Result<(), ControllerError> {
        match scanner.scan_result(self.spec.address) {
            Some(ScanOutcome::Matched(advertisement)) => {
                tracing::info!(name = ?advertisement.name, "hub discovered");
                self.phase = Phase::Discovered {
                    handle: advertisement.handle,
                };
                Ok(())
            }
            Some(ScanOutcome::Timeout) => {
                // The scanner is free again; start over straight away.
                if let Err(err) = scanner.try_scan(&self.spec) {
                    tracing::debug!(%err, "rescan deferred");
                }
                Err(ControllerError::DiscoveryTimeout {
                    address: self.spec.address,
                })
            }
            None => {
                if !matches!(self.phase, Phase::Discovering) {
                    tracing::debug!("discovery started");
                }
                self.phase = Phase::Discovering;
                if scanner.holder() == Some(self.spec.address) {
                    return Ok(());
                }
                scanner.try_scan(&self.spec)
            }
        }
    }

    async fn connect(&mut self) -> Result<(), ControllerError> {
        let handle = match std::mem::replace(&mut self.phase, Phase::Connecting) {
            Phase::Discovered { handle } => handle,
            other => {
                self.phase = other;
                return Ok(());
            }
        };

        match self.open_link(&handle).await {
            Ok(link) => {
                tracing::info!(
                    watchdog_tenths = self.settings.watchdog.tenths(),
                    "hub connected"
                );
                self.phase = Phase::Connected { link };
                self.dispatch_drive().await
            }
            Err(source) => {
                self.phase = Phase::Discovered { handle };
                Err(ControllerError::ConnectionFailed {
                    address: self.spec.address,
                    source,
                })
            }
        }
    }

    /// Connect and arm the watchdog. A link whose watchdog write fails is
    /// closed again so no half-configured connection survives.
    async fn open_link(&self, handle: &B::Handle) -> Result<B::Link, TransportError> {
        let timeout = self.settings.connect_timeout;
        let Ok(connected) = tokio::time::timeout(timeout, self.central.connect(handle)).await else {
            self.cancel_connect(handle).await;
            return Err(TransportError::Timeout(timeout));
        };
        let link = connected?;

        let watchdog = HubCommand::SetWatchdogTimeout(self.settings.watchdog);
        if let Err(err) = self.write(&link, &watchdog).await {
            if let Err(close_err) = self.central.disconnect(link).await {
                tracing::debug!(err = %close_err, "closing link after failed watchdog write");
            }
            return Err(err);
        }
        Ok(link)
    }

    /// Make sure an abandoned connect does not leave a link open behind our
    /// back.
    async fn cancel_connect(&self, handle: &B::Handle) {
        let cancelled =
            tokio::time::timeout(self.settings.command_timeout, self.central.cancel_connect(handle))
                .await;
        if cancelled.is_err() {
            tracing::debug!(hub = %self.spec.name, "cancelling abandoned connect timed out");
        }
    }

    async fn dispatch_drive(&mut self) -> Result<(), ControllerError> {
        let Phase::Connected { link } = &self.phase else {
            return Ok(());
        };

        let alive = tokio::time::timeout(self.settings.command_timeout, self.central.is_alive(link))
            .await
            .unwrap_or(false);

        let delivered = if !alive {
            false
        } else if let Some(drive) = self.drive {
            match self.write(link, &HubCommand::Drive(drive)).await {
                Ok(()) => true,
                Err(err) => {
                    tracing::debug!(%err, "drive write failed");
                    false
                }
            }
        } else {
            true
        };

        if delivered {
            return Ok(());
        }

        tracing::warn!("hub connection lost");
        self.drop_link().await;
        Err(ControllerError::ConnectionLost {
            address: self.spec.address,
        })
    }

    async fn write(&self, link: &B::Link, command: &HubCommand) -> Result<(), TransportError> {
        let timeout = self.settings.command_timeout;
        let bytes = command.encode();
        tokio::time::timeout(
            timeout,
            self.central.write(link, command.characteristic(), &bytes),
        )
        .await
        .map_err(|_| TransportError::Timeout(timeout))?
    }

    /// Forget the current link, closing it best-effort.
    async fn drop_link(&mut self) {
        if let Phase::Connected { link } = std::mem::replace(&mut self.phase, Phase::Idle) {
            if let Err(err) = self.central.disconnect(link).await {
                tracing::debug!(%err, hub = %self.spec.name, "disconnect failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_ble::{FakeCentral, ScanMode};
    use brickdrive_domain::command::REMOTE_CONTROL_COMMANDS;

    const SCAN: Duration = Duration::from_secs(1);
    const DELAY: Duration = Duration::from_secs(5);

    fn spec() -> HubSpec {
        HubSpec::builder()
            .name("YC66405")
            .address("00:07:80:d0:47:43")
            .build()
            .unwrap()
    }

    struct Harness {
        central: Arc<FakeCentral>,
        scanner: DiscoveryScanner<FakeCentral>,
        hub: HubConnection<FakeCentral>,
    }

    impl Harness {
        fn new() -> Self {
            let central = Arc::new(FakeCentral::default());
            central.advertise(spec().address, None);
            Self {
                scanner: DiscoveryScanner::new(Arc::clone(&central), SCAN),
                hub: HubConnection::new(spec(), Arc::clone(&central), LinkSettings::default()),
                central,
            }
        }

        async fn tick(&mut self) -> Result<HubState, ControllerError> {
            let result = self.hub.tick(&self.scanner).await;
            tokio::time::sleep(DELAY).await;
            result
        }

        /// Tick until connected: discover, collect the match, connect.
        async fn connect(&mut self) {
            self.tick().await.unwrap();
            self.tick().await.unwrap();
            assert_eq!(self.tick().await.unwrap(), HubState::Connected);
        }
    }

    fn watchdog_bytes(tenths: u8) -> Vec<u8> {
        HubCommand::SetWatchdogTimeout(WatchdogTimeout::from_tenths(tenths)).encode()
    }

    fn drive_bytes(channels: [i32; 4]) -> Vec<u8> {
        HubCommand::Drive(DriveCommand::new(channels)).encode()
    }

    #[tokio::test(start_paused = true)]
    async fn should_start_idle_and_disconnected() {
        let harness = Harness::new();
        assert_eq!(harness.hub.state(), HubState::Idle);
        assert!(!harness.hub.is_connected());
        assert!(!harness.hub.is_discovered());
    }

    #[tokio::test(start_paused = true)]
    async fn should_walk_from_idle_to_connected() {
        let mut h = Harness::new();

        assert_eq!(h.tick().await.unwrap(), HubState::Discovering);
        assert_eq!(h.tick().await.unwrap(), HubState::Discovered);
        assert!(h.hub.is_discovered());
        assert!(!h.hub.is_connected());
        assert_eq!(h.tick().await.unwrap(), HubState::Connected);
        assert!(h.hub.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn should_write_watchdog_once_per_connection() {
        let mut h = Harness::new();
        h.connect().await;
        h.tick().await.unwrap();
        h.tick().await.unwrap();

        let writes = h.central.writes_to(spec().address);
        assert_eq!(writes[0].bytes, watchdog_bytes(20));
        assert_eq!(writes[0].characteristic, REMOTE_CONTROL_COMMANDS);
        let watchdog_writes = writes
            .iter()
            .filter(|w| w.bytes == watchdog_bytes(20))
            .count();
        assert_eq!(watchdog_writes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_not_write_drive_when_none_was_set() {
        let mut h = Harness::new();
        h.connect().await;
        h.tick().await.unwrap();

        assert_eq!(h.central.payloads_to(spec().address), vec![watchdog_bytes(20)]);
        assert!(h.hub.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn should_drive_on_every_tick_while_connected() {
        let mut h = Harness::new();
        h.hub.set_drive(-75, -75, 75, 75);
        h.connect().await;
        h.tick().await.unwrap();

        assert_eq!(
            h.central.payloads_to(spec().address),
            vec![
                watchdog_bytes(20),
                drive_bytes([-75, -75, 75, 75]),
                drive_bytes([-75, -75, 75, 75]),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_clamp_drive_values() {
        let mut h = Harness::new();
        h.hub.set_drive(1000, -1000, 0, 255);
        assert_eq!(h.hub.drive().unwrap().channels(), [255, -255, 0, 255]);
    }

    #[tokio::test(start_paused = true)]
    async fn should_apply_new_drive_on_next_tick() {
        let mut h = Harness::new();
        h.hub.set_drive(10, 10, 10, 10);
        h.connect().await;
        h.hub.set_drive(0, 0, 0, 0);
        h.tick().await.unwrap();

        let payloads = h.central.payloads_to(spec().address);
        assert_eq!(payloads.last().unwrap(), &drive_bytes([0, 0, 0, 0]));
    }

    #[tokio::test(start_paused = true)]
    async fn should_retry_discovery_after_timeout() {
        let mut h = Harness::new();
        h.central.stop_advertising(spec().address);

        assert_eq!(h.tick().await.unwrap(), HubState::Discovering);
        let err = h.tick().await.unwrap_err();
        assert!(matches!(err, ControllerError::DiscoveryTimeout { .. }));
        assert_eq!(h.hub.state(), HubState::Discovering);
        assert_eq!(h.central.scans_started(), 2);

        h.central.advertise(spec().address, None);
        // The rescan started on the previous tick ran before the hub came up.
        assert!(h.tick().await.is_err());
        assert_eq!(h.tick().await.unwrap(), HubState::Discovered);
    }

    #[tokio::test(start_paused = true)]
    async fn should_stay_discovered_when_connect_fails() {
        let mut h = Harness::new();
        h.central.fail_next_connects(spec().address, 1);
        h.tick().await.unwrap();
        h.tick().await.unwrap();

        let err = h.tick().await.unwrap_err();
        assert!(matches!(err, ControllerError::ConnectionFailed { .. }));
        assert_eq!(h.hub.state(), HubState::Discovered);
        assert_eq!(h.central.open_links(spec().address), 0);

        assert_eq!(h.tick().await.unwrap(), HubState::Connected);
        assert_eq!(h.central.connects_attempted(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn should_bound_hanging_connect_with_timeout() {
        let mut h = Harness::new();
        h.central.hang_connects(spec().address);
        h.tick().await.unwrap();
        h.tick().await.unwrap();

        let err = h.tick().await.unwrap_err();
        match err {
            ControllerError::ConnectionFailed { source, .. } => {
                assert!(matches!(source, TransportError::Timeout(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(h.hub.state(), HubState::Discovered);
        assert_eq!(h.central.cancelled_connects(), 1);
        assert_eq!(h.central.open_links(spec().address), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_discovering_when_scan_hangs() {
        let mut h = Harness::new();
        h.central.set_scan_mode(ScanMode::Hang);

        assert_eq!(h.tick().await.unwrap(), HubState::Discovering);
        let err = h.tick().await.unwrap_err();
        assert!(matches!(err, ControllerError::DiscoveryTimeout { .. }));
        assert_eq!(h.hub.state(), HubState::Discovering);
        assert_eq!(h.central.cancelled_scans(), 1);

        h.central.set_scan_mode(ScanMode::Normal);
        // The rescan started above still hangs; the one after it runs normally.
        assert!(h.tick().await.is_err());
        assert_eq!(h.tick().await.unwrap(), HubState::Discovered);
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_discovering_when_scan_fails() {
        let mut h = Harness::new();
        h.central.set_scan_mode(ScanMode::Fail);

        assert_eq!(h.tick().await.unwrap(), HubState::Discovering);
        let err = h.tick().await.unwrap_err();
        assert!(matches!(err, ControllerError::DiscoveryTimeout { .. }));
        assert_eq!(h.hub.state(), HubState::Discovering);
    }

    #[tokio::test(start_paused = true)]
    async fn should_reset_to_idle_when_drive_write_hangs() {
        let mut h = Harness::new();
        h.hub.set_drive(50, 50, 50, 50);
        h.connect().await;

        h.central.hang_writes(spec().address);
        let err = h.tick().await.unwrap_err();
        assert!(matches!(err, ControllerError::ConnectionLost { .. }));
        assert_eq!(h.hub.state(), HubState::Idle);
        assert_eq!(h.central.open_links(spec().address), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_reset_to_idle_when_liveness_check_hangs() {
        let mut h = Harness::new();
        h.connect().await;

        h.central.hang_liveness(spec().address);
        let err = h.tick().await.unwrap_err();
        assert!(matches!(err, ControllerError::ConnectionLost { .. }));
        assert_eq!(h.hub.state(), HubState::Idle);
        assert_eq!(h.central.open_links(spec().address), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn should_treat_failed_watchdog_write_as_connection_failure() {
        let mut h = Harness::new();
        h.central.fail_writes(spec().address, true);
        h.tick().await.unwrap();
        h.tick().await.unwrap();

        let err = h.tick().await.unwrap_err();
        assert!(matches!(err, ControllerError::ConnectionFailed { .. }));
        assert_eq!(h.hub.state(), HubState::Discovered);
        assert_eq!(h.central.open_links(spec().address), 0);

        h.central.fail_writes(spec().address, false);
        assert_eq!(h.tick().await.unwrap(), HubState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn should_reset_to_idle_when_connection_is_lost() {
        let mut h = Harness::new();
        h.hub.set_drive(-75, -75, 75, 75);
        h.connect().await;
        let first_link = h.central.writes_to(spec().address)[0].link_id;

        h.central.drop_links(spec().address);
        let err = h.tick().await.unwrap_err();
        assert!(matches!(err, ControllerError::ConnectionLost { .. }));
        assert_eq!(h.hub.state(), HubState::Idle);
        assert!(!h.hub.is_discovered());
        assert_eq!(h.central.open_links(spec().address), 0);

        let writes_before = h.central.writes_to(spec().address).len();
        assert_eq!(h.tick().await.unwrap(), HubState::Discovering);
        assert_eq!(h.tick().await.unwrap(), HubState::Discovered);
        assert_eq!(h.central.writes_to(spec().address).len(), writes_before);

        assert_eq!(h.tick().await.unwrap(), HubState::Connected);
        let writes = h.central.writes_to(spec().address);
        let new_writes = &writes[writes_before..];
        assert!(new_writes.iter().all(|w| w.link_id != first_link));
        assert_eq!(new_writes[0].bytes, watchdog_bytes(20));
        assert_eq!(new_writes[1].bytes, drive_bytes([-75, -75, 75, 75]));
    }

    #[tokio::test(start_paused = true)]
    async fn should_reset_to_idle_when_drive_write_fails() {
        let mut h = Harness::new();
        h.hub.set_drive(50, 50, 50, 50);
        h.connect().await;

        h.central.fail_writes(spec().address, true);
        let err = h.tick().await.unwrap_err();
        assert!(matches!(err, ControllerError::ConnectionLost { .. }));
        assert_eq!(h.hub.state(), HubState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn should_never_hold_more_than_one_link() {
        let mut h = Harness::new();
        h.hub.set_drive(1, 2, 3, 4);
        h.central.fail_next_connects(spec().address, 2);
        for round in 0..30 {
            if round % 7 == 6 {
                h.central.drop_links(spec().address);
            }
            let _ = h.tick().await;
            assert!(h.central.open_links(spec().address) <= 1);
        }
        assert_eq!(h.central.max_open_per_hub(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_brake_and_disconnect_on_release() {
        let mut h = Harness::new();
        h.hub.set_drive(80, 80, 80, 80);
        h.connect().await;

        h.hub.release().await;

        assert_eq!(h.hub.state(), HubState::Idle);
        assert_eq!(h.central.open_links(spec().address), 0);
        let payloads = h.central.payloads_to(spec().address);
        assert_eq!(payloads.last().unwrap(), &HubCommand::Brake.encode());
    }

    #[tokio::test(start_paused = true)]
    async fn should_use_initial_drive_from_spec() {
        let central = Arc::new(FakeCentral::default());
        let spec = HubSpec::builder()
            .name("YC66405")
            .address("00:07:80:d0:47:43")
            .initial_drive(DriveCommand::new([-75, -75, 75, 75]))
            .build()
            .unwrap();
        let hub = HubConnection::new(spec, central, LinkSettings::default());
        assert_eq!(hub.drive(), Some(DriveCommand::new([-75, -75, 75, 75])));
    }
}
