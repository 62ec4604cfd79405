// ── Switch entities ──
//
// A `SwitchDescriptor` is the strategy table for one object kind; a
// `SwitchEntity` is one live switch built from it. Outlet control is the
// only descriptor today.

use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{DeviceInfo, EntityStateChanged, MANUFACTURER};
use crate::client::DeviceRequest;
use crate::dispatch::Signal;
use crate::error::CoreError;
use crate::model::{Event, OutletId, device_mac_of};
use crate::config::EntryOptions;
use crate::session::Session;
use crate::store::{ItemAction, ItemEvent, ObjectKind};

/// Future returned by a descriptor's control function.
pub type ControlFuture<'a> = BoxFuture<'a, Result<(), CoreError>>;

// ── Descriptor ───────────────────────────────────────────────────────

/// How objects of one kind map onto switch entities.
///
/// Built once at setup and shared read-only by every entity of the kind.
pub struct SwitchDescriptor {
    pub key: &'static str,
    pub kind: ObjectKind,
    pub allowed_fn: fn(&Session, &str) -> bool,
    pub supported_fn: fn(&Session, &str) -> bool,
    pub available_fn: fn(&Session, &str) -> bool,
    /// `None` when the object is gone from the store.
    pub is_on_fn: fn(&Session, &str) -> Option<bool>,
    pub control_fn: for<'a> fn(&'a Session, &'a str, bool) -> ControlFuture<'a>,
    pub name_fn: fn(&Session, &str) -> Option<String>,
    pub unique_id_fn: fn(&str) -> String,
    pub device_info_fn: fn(&Session, &str) -> Option<DeviceInfo>,
    /// Event keys that carry state for this kind.
    pub event_keys: Vec<String>,
    /// Subset of `event_keys` meaning "on".
    pub event_is_on_keys: Vec<String>,
    /// Ignore store changes; only events move the state.
    pub only_event_for_state_change: bool,
}

impl std::fmt::Debug for SwitchDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchDescriptor")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("event_keys", &self.event_keys)
            .field("event_is_on_keys", &self.event_is_on_keys)
            .field("only_event_for_state_change", &self.only_event_for_state_change)
            .finish_non_exhaustive()
    }
}

/// The switch descriptor table.
pub fn descriptors(options: &EntryOptions) -> Vec<Arc<SwitchDescriptor>> {
    vec![Arc::new(outlet_descriptor(options))]
}

fn outlet_descriptor(options: &EntryOptions) -> SwitchDescriptor {
    SwitchDescriptor {
        key: "Outlet control",
        kind: ObjectKind::Outlet,
        allowed_fn: outlet_allowed,
        supported_fn: outlet_supported,
        available_fn: outlet_available,
        is_on_fn: |session, id| session.store().outlet(id).map(|o| o.relay_state),
        control_fn: outlet_control,
        name_fn: |session, id| session.store().outlet(id).map(|o| o.name.clone()),
        unique_id_fn: outlet_unique_id,
        device_info_fn: device_info,
        event_keys: options.event_keys.clone(),
        event_is_on_keys: options.event_is_on_keys.clone(),
        only_event_for_state_change: false,
    }
}

// ── Outlet strategy functions ────────────────────────────────────────

fn outlet_allowed(session: &Session, id: &str) -> bool {
    !session.options().excluded_outlets.iter().any(|x| x == id)
}

fn outlet_supported(session: &Session, id: &str) -> bool {
    session
        .store()
        .outlet(id)
        .is_some_and(|outlet| outlet.is_switchable())
}

/// Reachable controller, device present and enabled, heartbeat not missed.
fn outlet_available(session: &Session, id: &str) -> bool {
    let mac = device_mac_of(id);
    session.available()
        && session.store().outlet(id).is_some()
        && session
            .store()
            .device(mac.as_str())
            .is_some_and(|device| !device.disabled)
        && !session.heartbeat_missed(mac.as_str())
}

fn outlet_unique_id(id: &str) -> String {
    id.parse::<OutletId>()
        .map_or_else(|_| id.to_owned(), |outlet| outlet.unique_id())
}

fn device_info(session: &Session, id: &str) -> Option<DeviceInfo> {
    let device = session.store().device(device_mac_of(id).as_str())?;
    Some(DeviceInfo {
        mac: device.mac.clone(),
        name: device.display_name().to_owned(),
        model: device.model.clone(),
        manufacturer: MANUFACTURER,
        firmware_version: device.firmware_version.clone(),
    })
}

fn outlet_control<'a>(session: &'a Session, id: &'a str, target: bool) -> ControlFuture<'a> {
    Box::pin(set_outlet_relay(session, id, target))
}

/// Switch one outlet relay.
///
/// `object_id` is `{device-mac}_{outlet-index}`. The device's override
/// list is rewritten with the target state and sent with
/// `PUT rest/device/{device_id}`.
pub async fn set_outlet_relay(
    session: &Session,
    object_id: &str,
    target: bool,
) -> Result<(), CoreError> {
    let outlet_id: OutletId = object_id.parse()?;
    let store = session.store();
    let device = store
        .device(outlet_id.mac.as_str())
        .ok_or_else(|| CoreError::DeviceNotFound {
            identifier: outlet_id.mac.to_string(),
        })?;
    let name = store
        .outlet(object_id)
        .map_or_else(|| format!("Outlet {}", outlet_id.index), |o| o.name.clone());

    debug!(outlet = %outlet_id, target, "outlet relay request");
    session
        .request(DeviceRequest::set_outlet_relay(
            &device,
            outlet_id.index,
            &name,
            target,
        ))
        .await
}

// ── SwitchEntity ─────────────────────────────────────────────────────

/// Cached state of one switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwitchState {
    pub is_on: bool,
    pub available: bool,
}

/// One on/off switch bound to a store object.
///
/// Cheaply cloneable; clones share the cached state.
#[derive(Clone)]
pub struct SwitchEntity {
    inner: Arc<SwitchInner>,
}

struct SwitchInner {
    object_id: String,
    unique_id: String,
    descriptor: Arc<SwitchDescriptor>,
    session: Session,
    state: Mutex<SwitchState>,
    cancel: CancellationToken,
}

impl SwitchEntity {
    pub(crate) fn new(session: Session, descriptor: Arc<SwitchDescriptor>, object_id: String) -> Self {
        let unique_id = (descriptor.unique_id_fn)(&object_id);
        let cancel = session.cancellation().child_token();
        Self {
            inner: Arc::new(SwitchInner {
                object_id,
                unique_id,
                descriptor,
                session,
                state: Mutex::new(SwitchState::default()),
                cancel,
            }),
        }
    }

    pub fn object_id(&self) -> &str {
        &self.inner.object_id
    }

    pub fn unique_id(&self) -> &str {
        &self.inner.unique_id
    }

    pub fn kind(&self) -> ObjectKind {
        self.inner.descriptor.kind
    }

    pub fn key(&self) -> &'static str {
        self.inner.descriptor.key
    }

    pub fn name(&self) -> Option<String> {
        (self.inner.descriptor.name_fn)(&self.inner.session, &self.inner.object_id)
    }

    pub fn device_info(&self) -> Option<DeviceInfo> {
        (self.inner.descriptor.device_info_fn)(&self.inner.session, &self.inner.object_id)
    }

    pub fn state(&self) -> SwitchState {
        *self.inner.state.lock().expect("switch state lock poisoned")
    }

    pub fn is_on(&self) -> bool {
        self.state().is_on
    }

    pub fn available(&self) -> bool {
        self.state().available
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub async fn turn_on(&self) -> Result<(), CoreError> {
        self.switch_to(true).await
    }

    pub async fn turn_off(&self) -> Result<(), CoreError> {
        self.switch_to(false).await
    }

    /// The cached state flips to `target` before the command is sent and
    /// stays there if the command fails.
    async fn switch_to(&self, target: bool) -> Result<(), CoreError> {
        self.with_state(|state| state.is_on = target);
        self.notify();

        let inner = &self.inner;
        let result = (inner.descriptor.control_fn)(&inner.session, &inner.object_id, target).await;
        if let Err(ref e) = result {
            warn!(entity = %inner.unique_id, target, error = %e, "switch command failed");
        }
        result
    }

    // ── State updates ────────────────────────────────────────────────

    /// Re-read state from the store after an item notification.
    pub fn update_state(&self, _event: &ItemEvent) {
        let inner = &self.inner;
        let available = (inner.descriptor.available_fn)(&inner.session, &inner.object_id);
        let is_on = if inner.descriptor.only_event_for_state_change {
            None
        } else {
            (inner.descriptor.is_on_fn)(&inner.session, &inner.object_id)
        };

        self.with_state(|state| {
            if let Some(is_on) = is_on {
                if state.is_on != is_on {
                    state.is_on = is_on;
                }
            }
            state.available = available;
        });
    }

    /// Apply a controller event. Events about other devices, or about a
    /// different outlet of this device, are ignored; device-level events
    /// apply to every outlet of the device.
    pub fn on_event(&self, event: &Event) {
        let inner = &self.inner;
        if !event.concerns(&inner.object_id) {
            return;
        }

        let descriptor = &inner.descriptor;
        let is_on = descriptor
            .event_keys
            .contains(&event.key)
            .then(|| descriptor.event_is_on_keys.contains(&event.key));
        let available = (descriptor.available_fn)(&inner.session, &inner.object_id);

        self.with_state(|state| {
            if let Some(is_on) = is_on {
                state.is_on = is_on;
            }
            state.available = available;
        });
        self.notify();
    }

    /// Initial state, as if the object had just been added.
    pub(crate) fn initiate_state(&self) {
        self.update_state(&ItemEvent {
            action: ItemAction::Added,
            key: self.inner.object_id.clone(),
        });
    }

    fn refresh_availability(&self) {
        let inner = &self.inner;
        let available = (inner.descriptor.available_fn)(&inner.session, &inner.object_id);
        self.with_state(|state| state.available = available);
    }

    fn with_state(&self, f: impl FnOnce(&mut SwitchState)) {
        let mut state = self.inner.state.lock().expect("switch state lock poisoned");
        f(&mut state);
    }

    /// Write the cached state out to listeners.
    pub fn notify(&self) {
        let state = self.state();
        self.inner.session.notify_entity(EntityStateChanged {
            unique_id: self.inner.unique_id.clone(),
            object_id: self.inner.object_id.clone(),
            is_on: state.is_on,
            available: state.available,
        });
    }

    // ── Listeners ────────────────────────────────────────────────────

    /// Subscribe to store, dispatcher and event updates for this entity.
    /// Runs until the session shuts down or the object is removed.
    pub(crate) fn spawn_listeners(&self) {
        let session = &self.inner.session;
        let mut items = session.store().subscribe(self.inner.descriptor.kind);
        let mut signals = session.dispatcher().subscribe();
        let mut events = session.events();
        let cancel = self.inner.cancel.clone();
        let entity = self.clone();

        session.track(tokio::spawn(async move {
            let device_mac = device_mac_of(entity.object_id());
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    item = items.recv() => match item {
                        Ok(item) if item.key == entity.inner.object_id => entity.handle_item(&item),
                        Ok(_) => {}
                        Err(RecvError::Lagged(n)) => {
                            warn!(entity = %entity.unique_id(), skipped = n, "item listener lagged");
                            entity.update_state(&ItemEvent {
                                action: ItemAction::Changed,
                                key: entity.inner.object_id.clone(),
                            });
                            entity.notify();
                        }
                        Err(RecvError::Closed) => break,
                    },
                    signal = signals.recv() => match signal {
                        Ok(Signal::Reachable) => {
                            entity.refresh_availability();
                            entity.notify();
                        }
                        Ok(Signal::HeartbeatMissed(id)) if id == device_mac.as_str() => {
                            entity.refresh_availability();
                            entity.notify();
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(n)) => {
                            warn!(entity = %entity.unique_id(), skipped = n, "signal listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    event = events.recv() => match event {
                        Ok(event) => entity.on_event(&event),
                        Err(RecvError::Lagged(n)) => {
                            warn!(entity = %entity.unique_id(), skipped = n, "event listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!(entity = %entity.unique_id(), "entity listeners stopped");
        }));
    }

    // Removal is driven by the registrar through `mark_removed`.
    fn handle_item(&self, item: &ItemEvent) {
        if item.action != ItemAction::Removed {
            self.update_state(item);
            self.notify();
        }
    }

    /// The object is gone: report unavailable once and stop listening.
    pub(crate) fn mark_removed(&self) {
        self.inner.cancel.cancel();
        self.with_state(|state| state.available = false);
        self.notify();
    }

    /// Stop this entity's listeners.
    pub fn remove(&self) {
        self.inner.cancel.cancel();
    }
}

impl std::fmt::Debug for SwitchEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchEntity")
            .field("unique_id", &self.inner.unique_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
