// ── API-to-domain type conversions ──
//
// Bridges raw `unipdu_api` response types into canonical `unipdu_core::model`
// domain types. Each conversion normalizes field names, parses strings into
// strong types, and fills sensible defaults for missing optional data.

use chrono::{DateTime, Utc};

use unipdu_api::legacy::models::{LegacyDevice, LegacyOutlet};
use unipdu_api::websocket::UnifiEvent;

use crate::model::{DeviceState, Event, MacAddress, Outlet, PduDevice};

// ── Helpers ────────────────────────────────────────────────────────

/// Convert an optional epoch-seconds timestamp to `DateTime<Utc>`.
fn epoch_to_datetime(epoch: Option<i64>) -> Option<DateTime<Utc>> {
    epoch.and_then(|ts| DateTime::from_timestamp(ts, 0))
}

/// Parse an ISO-8601 datetime string.
fn parse_datetime(raw: Option<&String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Metering values arrive as decimal strings.
fn parse_reading(raw: Option<&String>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse().ok())
}

fn map_device_state(code: i32) -> DeviceState {
    match code {
        0 => DeviceState::Offline,
        1 => DeviceState::Online,
        2 => DeviceState::PendingAdoption,
        4 => DeviceState::Updating,
        5 => DeviceState::GettingReady,
        _ => DeviceState::Unknown,
    }
}

// ── Devices ────────────────────────────────────────────────────────

impl From<&LegacyDevice> for PduDevice {
    fn from(d: &LegacyDevice) -> Self {
        PduDevice {
            id: d.id.clone(),
            mac: MacAddress::new(&d.mac),
            name: d.name.clone(),
            model: d.model.clone(),
            firmware_version: d.version.clone(),
            state: map_device_state(d.state),
            disabled: d.disabled.unwrap_or(false),
            next_interval: d.next_interval,
            last_seen: epoch_to_datetime(d.last_seen),
            outlet_overrides: d.outlet_overrides.clone(),
        }
    }
}

/// SmartPower devices report `type: "usp"`; anything with an outlet table
/// is treated the same way.
pub fn is_power_device(d: &LegacyDevice) -> bool {
    d.device_type == "usp" || !d.outlet_table.is_empty()
}

/// Outlets listed in a device's `outlet_table`.
pub fn outlets_of(d: &LegacyDevice) -> Vec<Outlet> {
    let mac = MacAddress::new(&d.mac);
    d.outlet_table
        .iter()
        .map(|o| outlet_from(&mac, o))
        .collect()
}

fn outlet_from(mac: &MacAddress, o: &LegacyOutlet) -> Outlet {
    Outlet {
        device_mac: mac.clone(),
        index: o.index,
        name: o
            .name
            .clone()
            .unwrap_or_else(|| format!("Outlet {}", o.index)),
        relay_state: o.relay_state,
        has_relay: o.has_relay,
        has_metering: o.has_metering,
        cycle_enabled: o.cycle_enabled,
        power_watts: parse_reading(o.outlet_power.as_ref()),
        voltage: parse_reading(o.outlet_voltage.as_ref()),
        current_amps: parse_reading(o.outlet_current.as_ref()),
        power_factor: parse_reading(o.outlet_power_factor.as_ref()),
    }
}

// ── Events ─────────────────────────────────────────────────────────

/// Extra fields the controller uses to name the device an event is about.
const EVENT_MAC_FIELDS: &[&str] = &["mac", "sw", "ap", "gw", "dev", "user"];
const EVENT_OUTLET_FIELDS: &[&str] = &["outlet_index", "port_idx"];

impl From<UnifiEvent> for Event {
    fn from(e: UnifiEvent) -> Self {
        let mac = EVENT_MAC_FIELDS
            .iter()
            .find_map(|field| e.extra.get(*field).and_then(|v| v.as_str()))
            .map(MacAddress::new);
        let outlet = EVENT_OUTLET_FIELDS
            .iter()
            .find_map(|field| e.extra.get(*field).and_then(serde_json::Value::as_u64))
            .and_then(|index| u32::try_from(index).ok());

        let site_id = if e.site_id.is_empty() {
            None
        } else {
            Some(e.site_id)
        };

        Event {
            timestamp: parse_datetime(e.datetime.as_ref()).unwrap_or_else(Utc::now),
            key: e.key,
            subsystem: e.subsystem,
            message: e.message.unwrap_or_default(),
            mac,
            outlet,
            site_id,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn legacy_device() -> LegacyDevice {
        serde_json::from_value(serde_json::json!({
            "_id": "dev1",
            "mac": "AA:BB:CC:DD:EE:FF",
            "type": "usp",
            "name": "Rack PDU",
            "state": 1,
            "disabled": true,
            "last_seen": 1_700_000_000,
            "outlet_table": [
                { "index": 1, "name": "Router", "relay_state": true, "has_relay": true,
                  "outlet_power": "12.50", "outlet_voltage": "120.1" },
                { "index": 2, "relay_state": false, "has_relay": false }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn device_conversion_normalizes_fields() {
        let device = PduDevice::from(&legacy_device());
        assert_eq!(device.mac.as_str(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(device.state, DeviceState::Online);
        assert!(device.disabled);
        assert!(device.last_seen.is_some());
    }

    #[test]
    fn outlets_carry_device_mac_and_readings() {
        let outlets = outlets_of(&legacy_device());
        assert_eq!(outlets.len(), 2);
        assert_eq!(outlets[0].outlet_id().to_string(), "aa:bb:cc:dd:ee:ff_1");
        assert_eq!(outlets[0].power_watts, Some(12.5));
        assert!(outlets[0].relay_state);
        assert_eq!(outlets[1].name, "Outlet 2");
        assert!(!outlets[1].is_switchable());
    }

    #[test]
    fn event_mac_comes_from_first_known_field() {
        let raw = UnifiEvent {
            key: "EVT_SW_Connected".into(),
            subsystem: "lan".into(),
            site_id: "site1".into(),
            message: Some("connected".into()),
            datetime: Some("2026-02-10T12:00:00Z".into()),
            extra: serde_json::json!({ "sw": "AA:BB:CC:DD:EE:FF", "user": "11:22:33:44:55:66" }),
        };

        let event = Event::from(raw);
        assert_eq!(event.mac.as_ref().unwrap().as_str(), "aa:bb:cc:dd:ee:ff");
        assert_eq!(event.site_id.as_deref(), Some("site1"));
        assert!(event.concerns("aa:bb:cc:dd:ee:ff_3"));
        assert!(event.concerns("aa:bb:cc:dd:ee:ff"));
        assert!(!event.concerns("11:22:33:44:55:66_1"));
        assert_eq!(event.outlet, None);
    }

    #[test]
    fn outlet_events_concern_only_their_outlet() {
        let raw = UnifiEvent {
            key: "EVT_USP_OutletOff".into(),
            subsystem: "lan".into(),
            site_id: "site1".into(),
            message: None,
            datetime: None,
            extra: serde_json::json!({ "mac": "AA:BB:CC:DD:EE:FF", "outlet_index": 2 }),
        };

        let event = Event::from(raw);
        assert_eq!(event.outlet, Some(2));
        assert!(event.concerns("aa:bb:cc:dd:ee:ff_2"));
        assert!(!event.concerns("aa:bb:cc:dd:ee:ff_1"));
        assert!(event.concerns("aa:bb:cc:dd:ee:ff"));
    }
}
