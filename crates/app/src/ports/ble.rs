//! BLE central port: scanning, connecting, and writing to hubs.

use std::future::Future;
use std::time::Duration;

use brickdrive_domain::command::CharacteristicId;
use brickdrive_domain::error::TransportError;
use brickdrive_domain::hub::HubAddress;

/// One advertisement seen during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement<H> {
    pub address: HubAddress,
    /// Advertised local name, when the scan response carried one.
    pub name: Option<String>,
    /// Adapter-specific handle used to open a connection.
    pub handle: H,
}

/// The BLE stack as seen by the controller core.
///
/// Implementations live in adapter crates (e.g. `adapter-ble`). Every
/// method must return in bounded time; the core wraps calls in timeouts
/// regardless.
pub trait BleCentral: Send + Sync + 'static {
    /// Handle to an advertising peripheral, valid until the next scan.
    type Handle: Send + Sync + 'static;

    /// An open connection to a hub.
    type Link: Send + Sync + 'static;

    /// Scan for `duration` and return every advertisement seen.
    fn scan(
        &self,
        duration: Duration,
    ) -> impl Future<Output = Result<Vec<Advertisement<Self::Handle>>, TransportError>> + Send;

    /// Open a connection to an advertised peripheral.
    fn connect(
        &self,
        handle: &Self::Handle,
    ) -> impl Future<Output = Result<Self::Link, TransportError>> + Send;

    /// Write `bytes` to a characteristic of an open link.
    fn write(
        &self,
        link: &Self::Link,
        characteristic: CharacteristicId,
        bytes: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Whether the link is still usable.
    fn is_alive(&self, link: &Self::Link) -> impl Future<Output = bool> + Send;

    /// Close a link. The link is gone afterwards even if this fails.
    fn disconnect(&self, link: Self::Link) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Tear down a connection attempt that was abandoned after its timeout,
    /// in case the stack completes it later.
    fn cancel_connect(&self, handle: &Self::Handle) -> impl Future<Output = ()> + Send;

    /// Stop a scan that was abandoned after its timeout.
    fn cancel_scan(&self) -> impl Future<Output = ()> + Send;
}
