// ── Device domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use unipdu_api::legacy::models::OutletOverride;

use super::entity_id::{MacAddress, OutletId};

/// Device operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DeviceState {
    Online,
    Offline,
    PendingAdoption,
    Updating,
    GettingReady,
    Unknown,
}

impl DeviceState {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

/// A SmartPower device (PDU or power strip) as tracked by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PduDevice {
    /// Controller object id (`_id`), used in `rest/device/{id}`.
    pub id: String,
    pub mac: MacAddress,
    pub name: Option<String>,
    pub model: Option<String>,
    pub firmware_version: Option<String>,
    pub state: DeviceState,
    pub disabled: bool,
    /// Seconds until the device's next expected inform.
    pub next_interval: Option<i64>,
    pub last_seen: Option<DateTime<Utc>>,
    pub outlet_overrides: Vec<OutletOverride>,
}

impl PduDevice {
    /// Name to show operators; falls back to the MAC.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.mac.as_str())
    }

    /// The override list to send when switching outlet `index`.
    ///
    /// Updates the existing entry for `index` in place, or appends a new
    /// `{index, name, relay_state}` entry. Every other entry is carried
    /// over untouched since the controller replaces the whole list.
    pub fn overrides_with_relay(
        &self,
        index: u32,
        name: &str,
        relay_state: bool,
    ) -> Vec<OutletOverride> {
        let mut overrides = self.outlet_overrides.clone();
        match overrides.iter_mut().find(|o| o.index == index) {
            Some(existing) => existing.relay_state = relay_state,
            None => overrides.push(OutletOverride {
                index,
                name: name.to_owned(),
                relay_state,
                cycle_enabled: None,
            }),
        }
        overrides
    }
}

/// One switchable outlet of a [`PduDevice`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outlet {
    pub device_mac: MacAddress,
    pub index: u32,
    pub name: String,
    pub relay_state: bool,
    pub has_relay: Option<bool>,
    pub has_metering: Option<bool>,
    pub cycle_enabled: Option<bool>,

    // Metering, when the hardware reports it
    pub power_watts: Option<f64>,
    pub voltage: Option<f64>,
    pub current_amps: Option<f64>,
    pub power_factor: Option<f64>,
}

impl Outlet {
    pub fn outlet_id(&self) -> OutletId {
        OutletId::new(self.device_mac.clone(), self.index)
    }

    /// Whether the outlet exposes a controllable relay. Unknown counts as yes.
    pub fn is_switchable(&self) -> bool {
        self.has_relay != Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn device(overrides: Vec<OutletOverride>) -> PduDevice {
        PduDevice {
            id: "dev1".into(),
            mac: MacAddress::new("aa:bb:cc:dd:ee:ff"),
            name: None,
            model: Some("USPPDUP".into()),
            firmware_version: None,
            state: DeviceState::Online,
            disabled: false,
            next_interval: Some(30),
            last_seen: None,
            outlet_overrides: overrides,
        }
    }

    fn entry(index: u32, name: &str, relay_state: bool) -> OutletOverride {
        OutletOverride {
            index,
            name: name.into(),
            relay_state,
            cycle_enabled: None,
        }
    }

    #[test]
    fn override_updates_existing_entry() {
        let dev = device(vec![entry(1, "Router", false), entry(2, "NAS", true)]);
        let overrides = dev.overrides_with_relay(1, "ignored", true);
        assert_eq!(overrides, vec![entry(1, "Router", true), entry(2, "NAS", true)]);
    }

    #[test]
    fn override_appends_missing_entry() {
        let dev = device(vec![entry(2, "NAS", true)]);
        let overrides = dev.overrides_with_relay(4, "Fan", false);
        assert_eq!(overrides, vec![entry(2, "NAS", true), entry(4, "Fan", false)]);
    }

    #[test]
    fn display_name_falls_back_to_mac() {
        assert_eq!(device(Vec::new()).display_name(), "aa:bb:cc:dd:ee:ff");
    }
}
