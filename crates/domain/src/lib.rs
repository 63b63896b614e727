//! # brickdrive-domain
//!
//! Pure domain model for the brickdrive hub controller.
//!
//! ## Responsibilities
//! - Foundational types: error taxonomy, timestamps
//! - Define **Hubs** (name + hardware address) and their lifecycle states
//! - Define **Drive commands** (four signed channels) and the hub-side
//!   **watchdog timeout**
//! - Encode **hub commands** into remote-control payloads
//! - Define the **status report** published after each sweep
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod time;

pub mod command;
pub mod drive;
pub mod hub;
pub mod status;
