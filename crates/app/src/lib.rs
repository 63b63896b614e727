//! # brickdrive-app
//!
//! Controller core — hub state machines, the shared scanner, the control
//! loop and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement:
//!   - `BleCentral` — scan, connect, write, liveness, disconnect
//!   - `BrokerPublisher` — publish one message to the broker
//! - Drive each hub through its connection lifecycle (`HubConnection`)
//! - Serialise BLE scans across hubs (`DiscoveryScanner`)
//! - Sweep all hubs on a fixed cadence (`HubRegistry`)
//! - Buffer status messages without ever blocking the loop (`OutboundQueue`)
//!
//! ## Dependency rule
//! Depends on `brickdrive-domain` only (plus `tokio` for tasks, channels
//! and timers). Never imports adapter crates. Adapters depend on *this*
//! crate, not the reverse.

pub mod connection;
pub mod control_loop;
pub mod outbound;
pub mod ports;
pub mod scanner;

#[cfg(test)]
mod fake_ble;
