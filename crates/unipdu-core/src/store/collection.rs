// ── Generic reactive entity collection ──
//
// Lock-free concurrent storage with O(1) lookups, a `watch` snapshot for
// whole-collection readers, and a `broadcast` of per-item add/change/remove
// notifications for entity listeners.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, watch};

const ITEM_EVENT_CAPACITY: usize = 256;

/// What happened to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ItemAction {
    Added,
    Changed,
    Removed,
}

/// Per-item notification emitted by every collection mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemEvent {
    pub action: ItemAction,
    pub key: String,
}

/// A lock-free, reactive collection for a single object kind.
///
/// Uses `DashMap` for O(1) concurrent lookups. The map is updated before
/// the matching [`ItemEvent`] is sent, so a listener reading the
/// collection on receipt always sees the new value.
pub(crate) struct EntityCollection<T: Send + Sync + 'static> {
    /// Primary storage: key string -> entity.
    by_key: DashMap<String, Arc<T>>,

    /// Item-level notifications.
    events: broadcast::Sender<ItemEvent>,

    /// Full snapshot, rebuilt on mutation for efficient subscription.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Send + Sync + 'static> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(ITEM_EVENT_CAPACITY);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            events,
            snapshot,
        }
    }

    /// Insert or update an entity. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, key: String, entity: T) -> bool {
        let is_new = self.by_key.insert(key.clone(), Arc::new(entity)).is_none();

        self.rebuild_snapshot();
        let action = if is_new {
            ItemAction::Added
        } else {
            ItemAction::Changed
        };
        // No receivers is fine.
        let _ = self.events.send(ItemEvent { action, key });

        is_new
    }

    /// Remove an entity by key. Returns the removed entity if it existed.
    pub(crate) fn remove(&self, key: &str) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.rebuild_snapshot();
            let _ = self.events.send(ItemEvent {
                action: ItemAction::Removed,
                key: key.to_owned(),
            });
        }
        removed
    }

    /// Look up an entity by its primary key string.
    pub(crate) fn get_by_key(&self, key: &str) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to item-level notifications.
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<ItemEvent> {
        self.events.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Return all current primary keys in the collection.
    pub(crate) fn keys(&self) -> Vec<String> {
        self.by_key.iter().map(|r| r.key().clone()).collect()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Collect all values into a snapshot vec and broadcast to subscribers.
    fn rebuild_snapshot(&self) {
        let values: Vec<Arc<T>> = self.by_key.iter().map(|r| Arc::clone(r.value())).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn upsert_returns_true_for_new_key() {
        let col: EntityCollection<String> = EntityCollection::new();
        assert!(col.upsert("key1".into(), "hello".into()));
        assert!(!col.upsert("key1".into(), "world".into()));
        assert_eq!(*col.get_by_key("key1").unwrap(), "world");
    }

    #[test]
    fn mutations_emit_item_events_in_order() {
        let col: EntityCollection<String> = EntityCollection::new();
        let mut rx = col.subscribe();

        col.upsert("a".into(), "x".into());
        col.upsert("a".into(), "y".into());
        col.remove("a");
        // Removing a missing key is silent.
        col.remove("a");

        let actions: Vec<ItemAction> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| {
                assert_eq!(e.key, "a");
                e.action
            })
            .collect();
        assert_eq!(
            actions,
            vec![ItemAction::Added, ItemAction::Changed, ItemAction::Removed]
        );
    }

    #[test]
    fn snapshot_reflects_current_state() {
        let col: EntityCollection<String> = EntityCollection::new();
        assert!(col.snapshot().is_empty());

        col.upsert("a".into(), "x".into());
        col.upsert("b".into(), "y".into());
        assert_eq!(col.snapshot().len(), 2);
        assert_eq!(col.len(), 2);

        col.remove("a");
        assert_eq!(col.snapshot().len(), 1);
        assert_eq!(col.keys(), vec!["b".to_owned()]);
    }
}
