// Legacy API response types
//
// Models for the UniFi controller's legacy JSON API. All responses are wrapped
// in the `LegacyResponse<T>` envelope. Fields use `#[serde(default)]` liberally
// because the API is inconsistent about field presence across firmware versions.

use serde::{Deserialize, Serialize};

// ── Response Envelope ────────────────────────────────────────────────

/// Standard UniFi legacy API response envelope.
///
/// Every legacy endpoint wraps its payload:
/// ```json
/// { "meta": { "rc": "ok", "msg": "optional" }, "data": [...] }
/// ```
#[derive(Debug, Deserialize)]
pub struct LegacyResponse<T> {
    pub meta: Meta,
    pub data: Vec<T>,
}

/// Metadata from the legacy envelope. `rc` == `"ok"` means success.
#[derive(Debug, Deserialize)]
pub struct Meta {
    pub rc: String,
    #[serde(default)]
    pub msg: Option<String>,
}

// ── Device ───────────────────────────────────────────────────────────

/// Full device object from `stat/device` (also the payload of `device:sync`).
///
/// The legacy API can return 100+ fields per device. We model the fields a
/// PDU session needs explicitly; everything else lands in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyDevice {
    #[serde(rename = "_id")]
    pub id: String,
    pub mac: String,
    #[serde(rename = "type", default)]
    pub device_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub adopted: bool,
    /// 0=offline, 1=online, 2=pending, 4=upgrading, 5=provisioning
    #[serde(default)]
    pub state: i32,
    #[serde(default)]
    pub disabled: Option<bool>,
    /// Seconds until the device's next expected inform.
    #[serde(default)]
    pub next_interval: Option<i64>,
    #[serde(default)]
    pub last_seen: Option<i64>,
    #[serde(default)]
    pub site_id: Option<String>,
    /// Live outlet state reported by SmartPower devices.
    #[serde(default)]
    pub outlet_table: Vec<LegacyOutlet>,
    /// Operator-set outlet configuration (relay state, names).
    #[serde(default)]
    pub outlet_overrides: Vec<OutletOverride>,
    /// Catch-all for undocumented fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One row of a device's `outlet_table`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyOutlet {
    pub index: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub relay_state: bool,
    #[serde(default)]
    pub cycle_enabled: Option<bool>,
    #[serde(default)]
    pub has_relay: Option<bool>,
    #[serde(default)]
    pub has_metering: Option<bool>,
    #[serde(default)]
    pub outlet_power: Option<String>,
    #[serde(default)]
    pub outlet_voltage: Option<String>,
    #[serde(default)]
    pub outlet_current: Option<String>,
    #[serde(default)]
    pub outlet_power_factor: Option<String>,
}

/// One entry of a device's `outlet_overrides`, sent back verbatim on update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutletOverride {
    pub index: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub relay_state: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_enabled: Option<bool>,
}

// ── Site ─────────────────────────────────────────────────────────────

/// Site object from `/api/self/sites`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacySite {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub desc: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// Catch-all for undocumented fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The logged-in account's view of a site, from `/api/s/{site}/self`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteDescription {
    #[serde(default)]
    pub site_role: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Catch-all for undocumented fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn pdu_device_parses_outlet_table() {
        let raw = serde_json::json!({
            "_id": "dev1",
            "mac": "aa:bb:cc:dd:ee:ff",
            "type": "usp",
            "model": "USPPDUP",
            "state": 1,
            "next_interval": 20,
            "outlet_table": [
                { "index": 1, "name": "Rack fan", "relay_state": true, "has_relay": true },
                { "index": 2, "relay_state": false, "outlet_power": "12.3" }
            ],
            "outlet_overrides": [
                { "index": 1, "name": "Rack fan", "relay_state": true }
            ],
            "uptime": 42
        });

        let device: LegacyDevice = serde_json::from_value(raw).unwrap();
        assert_eq!(device.outlet_table.len(), 2);
        assert!(device.outlet_table[0].relay_state);
        assert_eq!(device.outlet_table[1].name, None);
        assert_eq!(device.outlet_table[1].outlet_power.as_deref(), Some("12.3"));
        assert_eq!(device.outlet_overrides[0].index, 1);
        assert_eq!(device.next_interval, Some(20));
        assert_eq!(device.extra["uptime"], 42);
    }

    #[test]
    fn override_omits_unset_cycle_flag() {
        let o = OutletOverride {
            index: 3,
            name: "NAS".into(),
            relay_state: false,
            cycle_enabled: None,
        };
        let v = serde_json::to_value(&o).unwrap();
        assert!(v.get("cycle_enabled").is_none());
        assert_eq!(v["index"], 3);
    }
}
