//! In-memory [`BleCentral`] used by the unit tests.
//!
//! Records every scan, connection and write so tests can assert on the
//! traffic a hub would have seen.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use brickdrive_domain::command::CharacteristicId;
use brickdrive_domain::error::TransportError;
use brickdrive_domain::hub::HubAddress;

use crate::ports::{Advertisement, BleCentral};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FakeHandle(pub HubAddress);

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct FakeLink {
    pub address: HubAddress,
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedWrite {
    pub address: HubAddress,
    pub link_id: u64,
    pub characteristic: CharacteristicId,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum ScanMode {
    #[default]
    Normal,
    Hang,
    Fail,
    Panic,
}

#[derive(Default)]
struct State {
    advertising: Vec<(HubAddress, Option<String>)>,
    failing_connects: HashMap<HubAddress, usize>,
    failing_writes: HashSet<HubAddress>,
    hanging_connects: HashSet<HubAddress>,
    hanging_writes: HashSet<HubAddress>,
    hanging_liveness: HashSet<HubAddress>,
    scan_mode: ScanMode,
    cancelled_connects: usize,
    cancelled_scans: usize,
    dead_links: HashSet<u64>,
    open: HashMap<HubAddress, Vec<u64>>,
    max_open_per_hub: usize,
    next_link_id: u64,
    active_scans: usize,
    max_concurrent_scans: usize,
    scans_started: usize,
    connects_attempted: usize,
    writes: Vec<RecordedWrite>,
}

#[derive(Default)]
pub(crate) struct FakeCentral {
    state: Mutex<State>,
}

impl FakeCentral {
    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn advertise(&self, address: HubAddress, name: Option<&str>) {
        self.with_state(|s| s.advertising.push((address, name.map(str::to_owned))));
    }

    pub fn stop_advertising(&self, address: HubAddress) {
        self.with_state(|s| s.advertising.retain(|(a, _)| *a != address));
    }

    pub fn fail_next_connects(&self, address: HubAddress, count: usize) {
        self.with_state(|s| {
            s.failing_connects.insert(address, count);
        });
    }

    pub fn hang_connects(&self, address: HubAddress) {
        self.with_state(|s| {
            s.hanging_connects.insert(address);
        });
    }

    pub fn set_scan_mode(&self, mode: ScanMode) {
        self.with_state(|s| s.scan_mode = mode);
    }

    pub fn hang_writes(&self, address: HubAddress) {
        self.with_state(|s| {
            s.hanging_writes.insert(address);
        });
    }

    pub fn hang_liveness(&self, address: HubAddress) {
        self.with_state(|s| {
            s.hanging_liveness.insert(address);
        });
    }

    pub fn cancelled_connects(&self) -> usize {
        self.with_state(|s| s.cancelled_connects)
    }

    pub fn cancelled_scans(&self) -> usize {
        self.with_state(|s| s.cancelled_scans)
    }

    pub fn fail_writes(&self, address: HubAddress, failing: bool) {
        self.with_state(|s| {
            if failing {
                s.failing_writes.insert(address);
            } else {
                s.failing_writes.remove(&address);
            }
        });
    }

    /// Mark every open link to `address` as dead.
    pub fn drop_links(&self, address: HubAddress) {
        self.with_state(|s| {
            let ids = s.open.get(&address).cloned().unwrap_or_default();
            s.dead_links.extend(ids);
        });
    }

    pub fn writes_to(&self, address: HubAddress) -> Vec<RecordedWrite> {
        self.with_state(|s| {
            s.writes
                .iter()
                .filter(|w| w.address == address)
                .cloned()
                .collect()
        })
    }

    pub fn payloads_to(&self, address: HubAddress) -> Vec<Vec<u8>> {
        self.writes_to(address)
            .into_iter()
            .map(|w| w.bytes)
            .collect()
    }

    pub fn open_links(&self, address: HubAddress) -> usize {
        self.with_state(|s| s.open.get(&address).map_or(0, Vec::len))
    }

    pub fn max_open_per_hub(&self) -> usize {
        self.with_state(|s| s.max_open_per_hub)
    }

    pub fn scans_started(&self) -> usize {
        self.with_state(|s| s.scans_started)
    }

    pub fn max_concurrent_scans(&self) -> usize {
        self.with_state(|s| s.max_concurrent_scans)
    }

    pub fn connects_attempted(&self) -> usize {
        self.with_state(|s| s.connects_attempted)
    }
}

impl BleCentral for FakeCentral {
    type Handle = FakeHandle;
    type Link = FakeLink;

    async fn scan(
        &self,
        duration: Duration,
    ) -> Result<Vec<Advertisement<FakeHandle>>, TransportError> {
        let mode = self.with_state(|s| {
            s.active_scans += 1;
            s.scans_started += 1;
            s.max_concurrent_scans = s.max_concurrent_scans.max(s.active_scans);
            s.scan_mode
        });

        match mode {
            ScanMode::Normal => tokio::time::sleep(duration).await,
            ScanMode::Hang => std::future::pending::<()>().await,
            ScanMode::Fail => {
                self.with_state(|s| s.active_scans -= 1);
                return Err(TransportError::Adapter("adapter powered off".into()));
            }
            ScanMode::Panic => {
                self.with_state(|s| s.active_scans -= 1);
                panic!("adapter crashed mid-scan");
            }
        }

        Ok(self.with_state(|s| {
            s.active_scans -= 1;
            s.advertising
                .iter()
                .map(|(address, name)| Advertisement {
                    address: *address,
                    name: name.clone(),
                    handle: FakeHandle(*address),
                })
                .collect()
        }))
    }

    async fn connect(&self, handle: &FakeHandle) -> Result<FakeLink, TransportError> {
        let address = handle.0;
        let hang = self.with_state(|s| {
            s.connects_attempted += 1;
            s.hanging_connects.contains(&address)
        });
        if hang {
            std::future::pending::<()>().await;
        }

        self.with_state(|s| {
            if let Some(remaining) = s.failing_connects.get_mut(&address) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(TransportError::Adapter("connection refused".into()));
                }
            }

            s.next_link_id += 1;
            let id = s.next_link_id;
            let open = s.open.entry(address).or_default();
            open.push(id);
            s.max_open_per_hub = s.max_open_per_hub.max(open.len());
            Ok(FakeLink { address, id })
        })
    }

    async fn write(
        &self,
        link: &FakeLink,
        characteristic: CharacteristicId,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        if self.with_state(|s| s.hanging_writes.contains(&link.address)) {
            std::future::pending::<()>().await;
        }
        self.with_state(|s| {
            if s.failing_writes.contains(&link.address) || s.dead_links.contains(&link.id) {
                return Err(TransportError::Adapter("write failed".into()));
            }
            s.writes.push(RecordedWrite {
                address: link.address,
                link_id: link.id,
                characteristic,
                bytes: bytes.to_vec(),
            });
            Ok(())
        })
    }

    async fn is_alive(&self, link: &FakeLink) -> bool {
        if self.with_state(|s| s.hanging_liveness.contains(&link.address)) {
            std::future::pending::<()>().await;
        }
        self.with_state(|s| !s.dead_links.contains(&link.id))
    }

    async fn disconnect(&self, link: FakeLink) -> Result<(), TransportError> {
        self.with_state(|s| {
            if let Some(open) = s.open.get_mut(&link.address) {
                open.retain(|id| *id != link.id);
            }
        });
        Ok(())
    }

    async fn cancel_connect(&self, _handle: &FakeHandle) {
        self.with_state(|s| s.cancelled_connects += 1);
    }

    async fn cancel_scan(&self) {
        self.with_state(|s| {
            s.cancelled_scans += 1;
            s.active_scans = s.active_scans.saturating_sub(1);
        });
    }
}
