//! # brickdrive-adapter-ble
//!
//! BLE adapter: implements the `BleCentral` port on top of `btleplug`.
//!
//! ## How it works
//!
//! - **Scan**: listens to the adapter's event stream for the requested
//!   window, then resolves every peripheral seen into an advertisement
//!   (address, local name, peripheral handle).
//! - **Connect**: opens a GATT connection and discovers services so the
//!   remote-control characteristic can be looked up.
//! - **Write**: writes with response, so a dead link surfaces as an error
//!   instead of a silently dropped packet.
//!
//! ## Dependency rule
//!
//! Same as other adapters: depends on `brickdrive-app` and
//! `brickdrive-domain`.

mod central;
mod config;
mod error;

pub use central::{BtleplugCentral, HubLink};
pub use config::BleConfig;
pub use error::BleError;
