//! Discovery scanner: the one BLE scan shared by every hub.
//!
//! At most one scan runs at a time across the whole process. A hub asks for
//! a scan with [`DiscoveryScanner::try_scan`]; if another hub holds the
//! scanner the request is rejected and the hub retries on its next tick.
//! The scan itself runs on a background task and parks its outcome in the
//! shared slot until the requesting hub collects it with
//! [`DiscoveryScanner::scan_result`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use brickdrive_domain::error::ControllerError;
use brickdrive_domain::hub::{HubAddress, HubSpec};

use crate::ports::{Advertisement, BleCentral};

/// Extra time granted to the adapter on top of the scan duration before the
/// scan is abandoned.
const SCAN_GRACE: Duration = Duration::from_secs(2);

/// Outcome of a finished scan, as seen by the hub that requested it.
#[derive(Debug)]
pub enum ScanOutcome<H> {
    /// The hub was seen advertising.
    Matched(Advertisement<H>),
    /// The scan window closed without a matching advertisement.
    Timeout,
}

enum Slot<H> {
    Idle,
    Running { target: HubAddress },
    Finished { target: HubAddress, outcome: ScanOutcome<H> },
}

/// Shared, one-at-a-time BLE scanner.
pub struct DiscoveryScanner<B: BleCentral> {
    central: Arc<B>,
    duration: Duration,
    slot: Arc<Mutex<Slot<B::Handle>>>,
}

impl<B: BleCentral> DiscoveryScanner<B> {
    /// Create a scanner whose scans last `duration`.
    #[must_use]
    pub fn new(central: Arc<B>, duration: Duration) -> Self {
        Self {
            central,
            duration,
            slot: Arc::new(Mutex::new(Slot::Idle)),
        }
    }

    /// Configured scan window.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Hub currently holding the scanner, either scanning or with an
    /// uncollected result.
    #[must_use]
    pub fn holder(&self) -> Option<HubAddress> {
        match &*self.lock() {
            Slot::Idle => None,
            Slot::Running { target } | Slot::Finished { target, .. } => Some(*target),
        }
    }

    /// Start a background scan for `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::ScanUnavailable`] when any hub (including
    /// `target` itself) already holds the scanner.
    pub fn try_scan(&self, target: &HubSpec) -> Result<(), ControllerError> {
        {
            let mut slot = self.lock();
            if let Slot::Running { target: busy_with } | Slot::Finished { target: busy_with, .. } =
                &*slot
            {
                return Err(ControllerError::ScanUnavailable {
                    busy_with: *busy_with,
                });
            }
            *slot = Slot::Running {
                target: target.address,
            };
        }

        tracing::debug!(
            address = %target.address,
            duration = ?self.duration,
            "BLE scan started"
        );

        let central = Arc::clone(&self.central);
        let slot = Arc::clone(&self.slot);
        let duration = self.duration;
        let target = target.clone();

        tokio::spawn(async move {
            let mut guard = ScanGuard {
                slot,
                target: target.address,
                outcome: None,
            };
            guard.outcome = Some(scan_for(&*central, duration, &target).await);
        });

        Ok(())
    }

    /// Collect the finished scan for `address`, freeing the scanner.
    ///
    /// Returns `None` while the scan is still running, or when the scanner
    /// holds nothing for `address`.
    pub fn scan_result(&self, address: HubAddress) -> Option<ScanOutcome<B::Handle>> {
        let mut slot = self.lock();
        match &*slot {
            Slot::Finished { target, .. } if *target == address => {}
            _ => return None,
        }
        match std::mem::replace(&mut *slot, Slot::Idle) {
            Slot::Finished { outcome, .. } => Some(outcome),
            Slot::Idle | Slot::Running { .. } => None,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slot<B::Handle>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Parks the outcome in the shared slot when the scan task ends, including
/// when it unwinds, so the scanner never stays `Running` forever.
struct ScanGuard<H> {
    slot: Arc<Mutex<Slot<H>>>,
    target: HubAddress,
    outcome: Option<ScanOutcome<H>>,
}

impl<H> Drop for ScanGuard<H> {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or_else(|| {
            tracing::warn!(address = %self.target, "BLE scan task ended without a result");
            ScanOutcome::Timeout
        });
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Slot::Finished {
            target: self.target,
            outcome,
        };
    }
}

async fn scan_for<B: BleCentral>(
    central: &B,
    duration: Duration,
    target: &HubSpec,
) -> ScanOutcome<B::Handle> {
    let bound = duration + SCAN_GRACE;
    let advertisements = match tokio::time::timeout(bound, central.scan(duration)).await {
        Ok(Ok(advertisements)) => advertisements,
        Ok(Err(err)) => {
            tracing::warn!(%err, address = %target.address, "BLE scan failed");
            return ScanOutcome::Timeout;
        }
        Err(_) => {
            tracing::warn!(address = %target.address, "BLE scan did not finish in time");
            if tokio::time::timeout(SCAN_GRACE, central.cancel_scan())
                .await
                .is_err()
            {
                tracing::debug!(address = %target.address, "stopping abandoned BLE scan timed out");
            }
            return ScanOutcome::Timeout;
        }
    };

    tracing::trace!(
        seen = advertisements.len(),
        address = %target.address,
        "BLE scan finished"
    );

    advertisements
        .into_iter()
        .find(|adv| target.matches(adv.address, adv.name.as_deref()))
        .map_or(ScanOutcome::Timeout, ScanOutcome::Matched)
}
