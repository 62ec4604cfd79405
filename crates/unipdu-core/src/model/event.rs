// ── Event domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity_id::{MacAddress, OutletId, device_mac_of};

/// A discrete controller event from the WebSocket `events` stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    /// Controller event key, e.g. `"EVT_SW_Disconnected"`.
    pub key: String,
    pub subsystem: String,
    pub message: String,
    /// MAC of the device the event is about, if the controller named one.
    pub mac: Option<MacAddress>,
    /// Outlet index on that device, if the event names one.
    pub outlet: Option<u32>,
    pub site_id: Option<String>,
}

impl Event {
    /// Whether this event concerns `object_id`: either the device MAC
    /// itself or a composite outlet id rooted at that MAC.
    ///
    /// An event naming an outlet only concerns that outlet. A device-level
    /// event (no outlet) concerns every outlet of the device.
    pub fn concerns(&self, object_id: &str) -> bool {
        let Some(mac) = self.mac.as_ref() else {
            return false;
        };
        if *mac != device_mac_of(object_id) {
            return false;
        }
        match (self.outlet, object_id.parse::<OutletId>()) {
            (Some(event_index), Ok(outlet)) => event_index == outlet.index,
            _ => true,
        }
    }
}
