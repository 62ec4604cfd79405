// ── Refresh application logic ──
//
// Applies device data from the legacy API (full listings) and from
// WebSocket `device:sync` frames (one device at a time) into the DataStore.
// Devices are written before their outlets so that an outlet's `Added`
// notification never races ahead of its parent device.

use std::collections::HashSet;

use unipdu_api::legacy::models::LegacyDevice;

use super::DataStore;
use super::collection::EntityCollection;
use crate::convert::{is_power_device, outlets_of};
use crate::model::PduDevice;

/// Upsert all incoming entities, then prune any existing keys not in the
/// incoming set. This avoids the brief empty state that a clear causes.
fn upsert_and_prune<T: Send + Sync + 'static>(
    collection: &EntityCollection<T>,
    items: Vec<(String, T)>,
    keep: impl Fn(&str) -> bool,
) {
    let incoming_keys: HashSet<String> = items.iter().map(|(k, _)| k.clone()).collect();
    for (key, entity) in items {
        collection.upsert(key, entity);
    }
    for existing_key in collection.keys() {
        if !incoming_keys.contains(&existing_key) && !keep(&existing_key) {
            collection.remove(&existing_key);
        }
    }
}

impl DataStore {
    /// Apply a full device listing (`stat/device`).
    ///
    /// Non-power devices are ignored. Devices and outlets that are no
    /// longer reported are removed.
    pub(crate) fn apply_devices(&self, devices: &[LegacyDevice]) {
        let power: Vec<&LegacyDevice> = devices.iter().filter(|d| is_power_device(d)).collect();

        upsert_and_prune(
            &self.devices,
            power
                .iter()
                .map(|d| {
                    let device = PduDevice::from(*d);
                    (device.mac.to_string(), device)
                })
                .collect(),
            |_| false,
        );

        upsert_and_prune(
            &self.outlets,
            power
                .iter()
                .flat_map(|d| outlets_of(d))
                .map(|o| (o.outlet_id().to_string(), o))
                .collect(),
            |_| false,
        );
    }

    /// Apply a single device pushed over the event stream.
    ///
    /// Returns the stored device, or `None` if the payload was not a
    /// power device. Outlets of this device that vanished are removed;
    /// other devices are untouched.
    pub(crate) fn apply_device_sync(&self, raw: &LegacyDevice) -> Option<PduDevice> {
        if !is_power_device(raw) {
            return None;
        }

        let device = PduDevice::from(raw);
        let prefix = format!("{}_", device.mac);
        self.devices.upsert(device.mac.to_string(), device.clone());

        upsert_and_prune(
            &self.outlets,
            outlets_of(raw)
                .into_iter()
                .map(|o| (o.outlet_id().to_string(), o))
                .collect(),
            |key| !key.starts_with(&prefix),
        );

        Some(device)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::{ItemAction, ObjectKind};

    fn pdu(mac: &str, outlets: &[(u32, bool)]) -> LegacyDevice {
        let table: Vec<serde_json::Value> = outlets
            .iter()
            .map(|(index, on)| serde_json::json!({ "index": index, "relay_state": on }))
            .collect();
        serde_json::from_value(serde_json::json!({
            "_id": format!("id-{mac}"),
            "mac": mac,
            "type": "usp",
            "state": 1,
            "outlet_table": table,
        }))
        .unwrap()
    }

    #[test]
    fn full_listing_prunes_missing_objects() {
        let store = DataStore::new();
        store.apply_devices(&[pdu("aa:aa:aa:aa:aa:aa", &[(1, true), (2, false)])]);
        assert_eq!(store.outlet_count(), 2);

        store.apply_devices(&[pdu("aa:aa:aa:aa:aa:aa", &[(1, true)])]);
        assert_eq!(store.ids(ObjectKind::Outlet), vec!["aa:aa:aa:aa:aa:aa_1"]);
    }

    #[test]
    fn non_power_devices_are_skipped() {
        let store = DataStore::new();
        let ap: LegacyDevice = serde_json::from_value(serde_json::json!({
            "_id": "ap1", "mac": "bb:bb:bb:bb:bb:bb", "type": "uap"
        }))
        .unwrap();
        store.apply_devices(&[ap]);
        assert_eq!(store.device_count(), 0);
    }

    #[test]
    fn device_sync_only_touches_its_own_outlets() {
        let store = DataStore::new();
        store.apply_devices(&[
            pdu("aa:aa:aa:aa:aa:aa", &[(1, false), (2, false)]),
            pdu("cc:cc:cc:cc:cc:cc", &[(1, true)]),
        ]);
        let mut rx = store.subscribe(ObjectKind::Outlet);

        store
            .apply_device_sync(&pdu("aa:aa:aa:aa:aa:aa", &[(1, true)]))
            .unwrap();

        assert!(store.outlet("aa:aa:aa:aa:aa:aa_1").unwrap().relay_state);
        assert!(store.outlet("aa:aa:aa:aa:aa:aa_2").is_none());
        assert!(store.outlet("cc:cc:cc:cc:cc:cc_1").is_some());

        let first = rx.try_recv().unwrap();
        assert_eq!(first.action, ItemAction::Changed);
        let second = rx.try_recv().unwrap();
        assert_eq!(second.action, ItemAction::Removed);
        assert_eq!(second.key, "aa:aa:aa:aa:aa:aa_2");
    }
}
