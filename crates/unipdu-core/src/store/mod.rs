// ── Reactive data store ──
//
// Lock-free object storage with push-based change notification.

mod collection;
mod data_store;
mod refresh;

pub use collection::{ItemAction, ItemEvent};
pub use data_store::{DataStore, ObjectKind};
