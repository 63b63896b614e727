//! Status report published after each sweep.

use serde::{Deserialize, Serialize};

use crate::hub::{HubAddress, HubState};
use crate::time::Timestamp;

/// Snapshot of one hub for the status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStatus {
    pub name: String,
    pub address: HubAddress,
    pub state: HubState,
}

/// Controller-wide status, serialised as JSON onto the status topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Controller type identifier (e.g. `"MTC4SB"`).
    pub controller: String,
    pub timestamp: Timestamp,
    /// Milliseconds since the controller started.
    pub uptime_ms: u64,
    pub hubs: Vec<HubStatus>,
}

impl StatusReport {
    /// Number of hubs currently connected.
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.hubs
            .iter()
            .filter(|hub| hub.state == HubState::Connected)
            .count()
    }

    /// Serialise into the JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if serialisation fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
