//! [`BleCentral`] backed by the host's first BLE adapter.

use std::time::Duration;

use btleplug::api::{
    BDAddr, Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use tokio_stream::StreamExt as _;

use brickdrive_app::ports::{Advertisement, BleCentral};
use brickdrive_domain::command::CharacteristicId;
use brickdrive_domain::error::TransportError;
use brickdrive_domain::hub::HubAddress;

use crate::error::BleError;

/// Open connection to a hub: the peripheral with its services discovered.
#[derive(Debug)]
pub struct HubLink {
    peripheral: Peripheral,
}

/// BLE central built on `btleplug`.
///
/// Scan interval and window are left to the platform stack; `BlueZ` scans
/// actively, so scan responses (and with them local names) are read before
/// a scan completes.
pub struct BtleplugCentral {
    adapter: Adapter,
}

impl BtleplugCentral {
    /// Open the first BLE adapter on the host.
    ///
    /// # Errors
    ///
    /// Returns [`BleError::NotAvailable`] when the host has no adapter, or
    /// [`BleError::Scan`] when the platform manager cannot be reached.
    pub async fn first_adapter() -> Result<Self, BleError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(BleError::NotAvailable)?;

        match adapter.adapter_info().await {
            Ok(info) => tracing::info!(adapter = %info, "BLE adapter ready"),
            Err(err) => tracing::debug!(%err, "BLE adapter info unavailable"),
        }

        Ok(Self { adapter })
    }

    async fn scan_inner(
        &self,
        duration: Duration,
    ) -> Result<Vec<Advertisement<Peripheral>>, BleError> {
        let mut events = self.adapter.events().await?;
        self.adapter.start_scan(ScanFilter::default()).await?;

        let mut seen: Vec<PeripheralId> = Vec::new();
        let deadline = tokio::time::Instant::now() + duration;

        while tokio::time::Instant::now() < deadline {
            let remaining = deadline - tokio::time::Instant::now();
            let id = match tokio::time::timeout(remaining, events.next()).await {
                Ok(Some(
                    CentralEvent::DeviceDiscovered(id)
                    | CentralEvent::DeviceUpdated(id)
                    | CentralEvent::ManufacturerDataAdvertisement { id, .. }
                    | CentralEvent::ServiceDataAdvertisement { id, .. }
                    | CentralEvent::ServicesAdvertisement { id, .. },
                )) => id,
                Ok(Some(_)) => continue,
                Ok(None) | Err(_) => break,
            };
            if !seen.contains(&id) {
                seen.push(id);
            }
        }

        if let Err(err) = self.adapter.stop_scan().await {
            tracing::debug!(%err, "failed to stop BLE scan");
        }

        let mut advertisements = Vec::with_capacity(seen.len());
        for id in &seen {
            let Ok(peripheral) = self.adapter.peripheral(id).await else {
                continue;
            };
            let Ok(Some(props)) = peripheral.properties().await else {
                continue;
            };
            tracing::trace!(
                address = %props.address,
                name = ?props.local_name,
                rssi = ?props.rssi,
                "BLE device detected"
            );
            advertisements.push(Advertisement {
                address: hub_address(props.address),
                name: props.local_name,
                handle: peripheral,
            });
        }

        Ok(advertisements)
    }

    async fn connect_inner(peripheral: &Peripheral) -> Result<HubLink, BleError> {
        peripheral.connect().await.map_err(BleError::GattConnect)?;

        if let Err(err) = peripheral.discover_services().await {
            if let Err(close_err) = peripheral.disconnect().await {
                tracing::debug!(err = %close_err, "failed to disconnect after service discovery");
            }
            return Err(err.into());
        }

        Ok(HubLink {
            peripheral: peripheral.clone(),
        })
    }

    async fn write_inner(
        link: &HubLink,
        characteristic: CharacteristicId,
        bytes: &[u8],
    ) -> Result<(), BleError> {
        let target = find_characteristic(&link.peripheral, characteristic.as_uuid())?;
        link.peripheral
            .write(&target, bytes, WriteType::WithResponse)
            .await?;
        Ok(())
    }
}

impl BleCentral for BtleplugCentral {
    type Handle = Peripheral;
    type Link = HubLink;

    async fn scan(
        &self,
        duration: Duration,
    ) -> Result<Vec<Advertisement<Peripheral>>, TransportError> {
        Ok(self.scan_inner(duration).await?)
    }

    async fn connect(&self, handle: &Peripheral) -> Result<HubLink, TransportError> {
        Ok(Self::connect_inner(handle).await?)
    }

    async fn write(
        &self,
        link: &HubLink,
        characteristic: CharacteristicId,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        Ok(Self::write_inner(link, characteristic, bytes).await?)
    }

    async fn is_alive(&self, link: &HubLink) -> bool {
        link.peripheral.is_connected().await.unwrap_or(false)
    }

    async fn disconnect(&self, link: HubLink) -> Result<(), TransportError> {
        link.peripheral
            .disconnect()
            .await
            .map_err(|err| BleError::Scan(err).into_transport())
    }

    async fn cancel_connect(&self, handle: &Peripheral) {
        if let Err(err) = handle.disconnect().await {
            tracing::debug!(%err, "failed to tear down abandoned connection");
        }
    }

    async fn cancel_scan(&self) {
        if let Err(err) = self.adapter.stop_scan().await {
            tracing::debug!(%err, "failed to stop abandoned BLE scan");
        }
    }
}

/// Find a GATT characteristic by UUID on a peripheral that has already
/// discovered its services.
fn find_characteristic(
    peripheral: &Peripheral,
    uuid: uuid::Uuid,
) -> Result<Characteristic, BleError> {
    peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == uuid)
        .ok_or(BleError::CharacteristicNotFound { uuid })
}

fn hub_address(address: BDAddr) -> HubAddress {
    HubAddress::from_bytes(address.into_inner())
}
