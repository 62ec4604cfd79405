// ── Central reactive data store ──
//
// Thread-safe, lock-free storage for PDU devices and their outlets.
// Mutations are broadcast to subscribers as `ItemEvent`s.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};

use super::collection::{EntityCollection, ItemEvent};
use crate::model::{Outlet, PduDevice};

/// The object kinds a [`DataStore`] holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ObjectKind {
    /// Keyed by device MAC.
    Device,
    /// Keyed by composite outlet id (`{mac}_{index}`).
    Outlet,
}

/// Central reactive store for the session's controller objects.
///
/// Thread-safe and lock-free: all reads are wait-free, writes use
/// fine-grained per-shard locks within `DashMap`.
pub struct DataStore {
    pub(crate) devices: EntityCollection<PduDevice>,
    pub(crate) outlets: EntityCollection<Outlet>,
    pub(crate) last_ws_event: watch::Sender<Option<DateTime<Utc>>>,
}

impl DataStore {
    pub fn new() -> Self {
        let (last_ws_event, _) = watch::channel(None);

        Self {
            devices: EntityCollection::new(),
            outlets: EntityCollection::new(),
            last_ws_event,
        }
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<PduDevice>>> {
        self.devices.snapshot()
    }

    pub fn outlets_snapshot(&self) -> Arc<Vec<Arc<Outlet>>> {
        self.outlets.snapshot()
    }

    // ── Single-object lookups ────────────────────────────────────────

    pub fn device(&self, mac: &str) -> Option<Arc<PduDevice>> {
        self.devices.get_by_key(mac)
    }

    pub fn outlet(&self, id: &str) -> Option<Arc<Outlet>> {
        self.outlets.get_by_key(id)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn outlet_count(&self) -> usize {
        self.outlets.len()
    }

    // ── Kind-generic access ──────────────────────────────────────────

    /// Every id currently stored for `kind`.
    pub fn ids(&self, kind: ObjectKind) -> Vec<String> {
        match kind {
            ObjectKind::Device => self.devices.keys(),
            ObjectKind::Outlet => self.outlets.keys(),
        }
    }

    /// Item-level add/change/remove notifications for `kind`.
    pub fn subscribe(&self, kind: ObjectKind) -> broadcast::Receiver<ItemEvent> {
        match kind {
            ObjectKind::Device => self.devices.subscribe(),
            ObjectKind::Outlet => self.outlets.subscribe(),
        }
    }

    // ── Metadata ─────────────────────────────────────────────────────

    pub fn last_ws_event(&self) -> Option<DateTime<Utc>> {
        *self.last_ws_event.borrow()
    }

    pub(crate) fn mark_ws_event(&self, at: DateTime<Utc>) {
        self.last_ws_event.send_replace(Some(at));
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}
