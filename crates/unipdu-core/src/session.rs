// ── Controller session ──
//
// Lifecycle of one controller connection: initial login and site
// discovery, the push-event bridge, fixed-delay reconnects, and the
// heartbeat staleness sweep. One `Session` per config entry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use unipdu_api::legacy::models::LegacyDevice;
use unipdu_api::{StreamState, UnifiEvent};

use crate::client::{ControllerClient, DeviceRequest, EventStream};
use crate::config::{EntryOptions, SessionConfig};
use crate::convert::is_power_device;
use crate::dispatch::{Dispatcher, Signal};
use crate::entity::EntityStateChanged;
use crate::error::CoreError;
use crate::model::{Event, PduDevice};
use crate::store::{DataStore, ObjectKind};

const EVENT_CHANNEL_SIZE: usize = 256;
const ENTITY_CHANNEL_SIZE: usize = 256;

/// Grace period added to a device's own inform interval before its
/// heartbeat counts as missed.
const HEARTBEAT_GRACE_SECS: i64 = 60;

/// Upper bound on a device-reported inform interval (one day).
const MAX_INFORM_INTERVAL_SECS: i64 = 86_400;

// ── ConnectionState ──────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
}

/// Where the configured site lives on the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteInfo {
    /// Controller-internal site id (`_id`).
    pub id: String,
    /// Human-readable site description.
    pub description: Option<String>,
    /// The logged-in account's role on this site (e.g. `"admin"`).
    pub role: Option<String>,
}

// ── Session ──────────────────────────────────────────────────────

/// A live controller session.
///
/// Cheaply cloneable via `Arc<SessionInner>`. Created by
/// [`connect()`](Self::connect); background work starts with
/// [`initialize()`](Self::initialize) and stops with
/// [`shutdown()`](Self::shutdown).
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    client: Arc<dyn ControllerClient>,
    store: Arc<DataStore>,
    dispatcher: Dispatcher,
    connection_state: watch::Sender<ConnectionState>,
    event_tx: broadcast::Sender<Arc<Event>>,
    entity_tx: broadcast::Sender<EntityStateChanged>,
    site: RwLock<SiteInfo>,
    options: RwLock<EntryOptions>,
    /// Controller reachability as seen by entities.
    available: AtomicBool,
    /// Tracked object id -> heartbeat expiry.
    heartbeats: DashMap<String, DateTime<Utc>>,
    /// Objects whose heartbeat expired and has not been refreshed since.
    missed: DashSet<String>,
    /// `(kind, id)` pairs that already have an entity.
    known: DashSet<(ObjectKind, String)>,
    /// Set while a reconnect loop is scheduled or running.
    reconnecting: AtomicBool,
    shut_down: AtomicBool,
    cancel: CancellationToken,
    /// Cancelled whenever the current event stream is replaced.
    stream_cancel: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Detect the controller platform, log in, resolve the site and load devices.
    ///
    /// Platform detection and login run under `config.connect_timeout`. Every failure is
    /// reported as either [`CoreError::ConnectionFailed`] or
    /// [`CoreError::AuthenticationFailed`].
    pub async fn connect(
        config: SessionConfig,
        client: Arc<dyn ControllerClient>,
    ) -> Result<Self, CoreError> {
        let session = Self::new(config, client);
        let _ = session
            .inner
            .connection_state
            .send_replace(ConnectionState::Connecting);

        match session.establish().await {
            Ok(()) => {
                session.inner.available.store(true, Ordering::SeqCst);
                let _ = session
                    .inner
                    .connection_state
                    .send_replace(ConnectionState::Connected);
                info!(
                    url = %session.inner.config.url,
                    site = %session.inner.config.site,
                    devices = session.inner.store.device_count(),
                    outlets = session.inner.store.outlet_count(),
                    "connected to controller"
                );
                Ok(session)
            }
            Err(e) => {
                let _ = session
                    .inner
                    .connection_state
                    .send_replace(ConnectionState::Disconnected);
                Err(e.into_setup_kind(session.inner.config.url.as_str()))
            }
        }
    }

    fn new(config: SessionConfig, client: Arc<dyn ControllerClient>) -> Self {
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let (entity_tx, _) = broadcast::channel(ENTITY_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let stream_cancel = cancel.child_token();

        Self {
            inner: Arc::new(SessionInner {
                config,
                client,
                store: Arc::new(DataStore::new()),
                dispatcher: Dispatcher::new(),
                connection_state,
                event_tx,
                entity_tx,
                site: RwLock::new(SiteInfo::default()),
                options: RwLock::new(EntryOptions::default()),
                available: AtomicBool::new(false),
                heartbeats: DashMap::new(),
                missed: DashSet::new(),
                known: DashSet::new(),
                reconnecting: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                cancel,
                stream_cancel: Mutex::new(stream_cancel),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    async fn establish(&self) -> Result<(), CoreError> {
        let inner = &self.inner;
        let timeout = inner.config.connect_timeout;

        tokio::time::timeout(timeout, async {
            let platform = inner.client.check_protocol().await?;
            debug!(?platform, "detected controller platform");
            inner.client.login().await?;
            debug!("session authentication successful");
            Ok::<(), CoreError>(())
        })
        .await
        .map_err(|_| CoreError::Timeout {
            timeout_secs: timeout.as_secs(),
        })??;

        let sites = inner.client.sites().await?;
        let site = sites
            .into_iter()
            .find(|s| s.name == inner.config.site)
            .ok_or_else(|| CoreError::SiteNotFound {
                name: inner.config.site.clone(),
            })?;

        let description = inner.client.site_description().await?;
        let role = description.into_iter().next().and_then(|d| d.site_role);
        debug!(site_id = %site.id, role = ?role, "resolved site");

        *inner.site.write().expect("site lock poisoned") = SiteInfo {
            id: site.id,
            description: site.desc,
            role,
        };

        let devices = inner.client.devices().await?;
        self.load_devices(&devices);
        Ok(())
    }

    /// Apply a full device listing and seed heartbeats for every device.
    fn load_devices(&self, devices: &[LegacyDevice]) {
        self.inner.store.apply_devices(devices);
        let now = Utc::now();
        for device in self.inner.store.devices_snapshot().iter() {
            self.heartbeat(device.mac.as_str(), heartbeat_expiry(device, now));
        }
    }

    /// Start background work: the heartbeat sweep and the event stream.
    pub fn initialize(&self) {
        let period = self.inner.config.heartbeat_interval;
        let session = self.clone();
        let cancel = self.inner.cancel.clone();
        self.track(tokio::spawn(heartbeat_task(session, period, cancel)));

        match self.inner.client.start_event_stream() {
            Ok(stream) => self.spawn_bridge(stream),
            Err(e) => {
                warn!(error = %e, "event stream failed to start");
                self.reconnect();
            }
        }
    }

    // ── Reconnect ────────────────────────────────────────────────────

    /// Schedule a reconnect loop.
    ///
    /// Returns `false` if a loop is already in flight or the session has
    /// shut down. Each attempt runs login plus stream restart under
    /// `reconnect_timeout`; failures wait a fixed `reconnect_delay`.
    pub fn reconnect(&self) -> bool {
        if self.inner.cancel.is_cancelled() {
            return false;
        }
        if self.inner.reconnecting.swap(true, Ordering::SeqCst) {
            debug!("reconnect already scheduled");
            return false;
        }

        info!("will try to reconnect to controller");
        let session = self.clone();
        self.track(tokio::spawn(async move {
            session.reconnect_loop().await;
        }));
        true
    }

    async fn reconnect_loop(&self) {
        let cancel = self.inner.cancel.clone();
        let timeout = self.inner.config.reconnect_timeout;
        let delay = self.inner.config.reconnect_delay;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let _ = self
                .inner
                .connection_state
                .send_replace(ConnectionState::Reconnecting { attempt });

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = tokio::time::timeout(timeout, self.try_reconnect()) => result,
            };

            match result {
                Ok(Ok(stream)) => {
                    info!(attempt, "reconnected to controller");
                    // Clear the guard before the new bridge can ask for another loop.
                    self.inner.reconnecting.store(false, Ordering::SeqCst);
                    self.spawn_bridge(stream);
                    let _ = self
                        .inner
                        .connection_state
                        .send_replace(ConnectionState::Connected);
                    self.set_available(true);
                    return;
                }
                Ok(Err(e)) => warn!(error = %e, attempt, "reconnect attempt failed"),
                Err(_) => warn!(attempt, timeout_secs = timeout.as_secs(), "reconnect attempt timed out"),
            }

            debug!(delay_secs = delay.as_secs(), "scheduling reconnect retry");
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.inner.reconnecting.store(false, Ordering::SeqCst);
    }

    async fn try_reconnect(&self) -> Result<EventStream, CoreError> {
        // Retire the current bridge so a stream we replace is not mistaken for a loss.
        self.inner
            .stream_cancel
            .lock()
            .expect("stream lock poisoned")
            .cancel();
        self.inner.client.login().await?;
        Ok(self.inner.client.start_event_stream()?)
    }

    // ── Shutdown ─────────────────────────────────────────────────────

    /// Stop the event stream and cancel every task the session spawned.
    /// Idempotent.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("shutting down session");
        self.inner.cancel.cancel();
        self.inner.client.stop_event_stream();
        self.inner.available.store(false, Ordering::SeqCst);
        let _ = self
            .inner
            .connection_state
            .send_replace(ConnectionState::Disconnected);
    }

    /// Wait for every spawned task to finish. Call after
    /// [`shutdown()`](Self::shutdown). Returns `false` if any task panicked.
    pub async fn join(&self) -> bool {
        let mut clean = true;
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut guard = self.inner.task_handles.lock().expect("task lock poisoned");
                guard.drain(..).collect()
            };
            if handles.is_empty() {
                return clean;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    if e.is_panic() {
                        warn!(error = %e, "session task panicked");
                        clean = false;
                    }
                }
            }
        }
    }

    // ── Heartbeats ───────────────────────────────────────────────────

    /// Track (or refresh) an object's heartbeat expiry.
    pub fn heartbeat(&self, id: &str, expires_at: DateTime<Utc>) {
        self.inner.heartbeats.insert(id.to_owned(), expires_at);
        self.inner.missed.remove(id);
    }

    /// Sweep expired heartbeats.
    ///
    /// Every tracked id whose expiry is before `now` gets exactly one
    /// [`Signal::HeartbeatMissed`] and stops being tracked. Returns the
    /// swept ids.
    pub fn check_stale(&self, now: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<String> = self
            .inner
            .heartbeats
            .iter()
            .filter(|entry| *entry.value() < now)
            .map(|entry| entry.key().clone())
            .collect();

        let mut swept = Vec::with_capacity(expired.len());
        for id in expired {
            if self
                .inner
                .heartbeats
                .remove_if(&id, |_, expiry| *expiry < now)
                .is_some()
            {
                debug!(id, "heartbeat missed");
                self.inner.missed.insert(id.clone());
                self.inner
                    .dispatcher
                    .send(Signal::HeartbeatMissed(id.clone()));
                swept.push(id);
            }
        }
        swept
    }

    /// Whether `id` is currently tracked.
    pub fn is_tracked(&self, id: &str) -> bool {
        self.inner.heartbeats.contains_key(id)
    }

    /// Whether `id` missed its heartbeat and has not been refreshed since.
    pub fn heartbeat_missed(&self, id: &str) -> bool {
        self.inner.missed.contains(id)
    }

    // ── Event stream bridge ──────────────────────────────────────────

    /// Relay one stream's frames into the store and the event broadcast.
    /// When the stream stops, reachability drops and a reconnect is scheduled.
    fn spawn_bridge(&self, stream: EventStream) {
        let cancel = {
            let mut guard = self.inner.stream_cancel.lock().expect("stream lock poisoned");
            guard.cancel();
            *guard = self.inner.cancel.child_token();
            guard.clone()
        };

        let session = self.clone();
        self.track(tokio::spawn(async move {
            let EventStream {
                mut events,
                mut state,
            } = stream;

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    result = events.recv() => match result {
                        Ok(event) => session.handle_stream_event(&event),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "event bridge: receiver lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    changed = state.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let current = *state.borrow_and_update();
                        match current {
                            StreamState::Running => session.set_available(true),
                            StreamState::Stopped => break,
                            StreamState::Connecting => {}
                        }
                    }
                }
            }

            if cancel.is_cancelled() {
                return;
            }
            warn!("event stream lost");
            session.set_available(false);
            session.reconnect();
        }));
    }

    fn handle_stream_event(&self, raw: &UnifiEvent) {
        let now = Utc::now();
        self.inner.store.mark_ws_event(now);

        match raw.key.as_str() {
            "device:sync" | "device:update" => {
                match serde_json::from_value::<LegacyDevice>(raw.extra.clone()) {
                    Ok(device) if is_power_device(&device) => {
                        // Refresh first: listeners woken by the store update
                        // must already see the device as alive.
                        let pdu = PduDevice::from(&device);
                        self.heartbeat(pdu.mac.as_str(), heartbeat_expiry(&pdu, now));
                        self.inner.store.apply_device_sync(&device);
                    }
                    Ok(_) => {}
                    Err(e) => debug!(error = %e, key = %raw.key, "skipping partial device frame"),
                }
            }
            key if key.ends_with(":sync") || key.ends_with(":update") => {}
            _ => {
                let event = Event::from(raw.clone());
                debug!(key = %event.key, mac = ?event.mac, "controller event");
                let _ = self.inner.event_tx.send(Arc::new(event));
            }
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Send a device request. An expired login schedules a reconnect.
    pub async fn request(&self, request: DeviceRequest) -> Result<(), CoreError> {
        match self.inner.client.request(request).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if e.is_auth_expired() {
                    self.reconnect();
                }
                Err(e.into())
            }
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// Discrete controller events (not `*:sync` state dumps).
    pub fn events(&self) -> broadcast::Receiver<Arc<Event>> {
        self.inner.event_tx.subscribe()
    }

    /// Entity state notifications.
    pub fn entity_updates(&self) -> broadcast::Receiver<EntityStateChanged> {
        self.inner.entity_tx.subscribe()
    }

    pub(crate) fn notify_entity(&self, update: EntityStateChanged) {
        let _ = self.inner.entity_tx.send(update);
    }

    pub fn site(&self) -> SiteInfo {
        self.inner.site.read().expect("site lock poisoned").clone()
    }

    pub fn site_role(&self) -> Option<String> {
        self.inner.site.read().expect("site lock poisoned").role.clone()
    }

    pub fn available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Flip reachability; fires [`Signal::Reachable`] only on change.
    pub(crate) fn set_available(&self, available: bool) {
        if self.inner.available.swap(available, Ordering::SeqCst) != available {
            info!(available, "controller reachability changed");
            self.inner.dispatcher.send(Signal::Reachable);
        }
    }

    pub fn options(&self) -> EntryOptions {
        self.inner.options.read().expect("options lock poisoned").clone()
    }

    pub fn set_options(&self, options: EntryOptions) {
        *self.inner.options.write().expect("options lock poisoned") = options;
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    // ── Known objects ────────────────────────────────────────────────

    pub fn is_known(&self, kind: ObjectKind, id: &str) -> bool {
        self.inner.known.contains(&(kind, id.to_owned()))
    }

    /// Atomically claim `(kind, id)` for a new entity. `false` if taken.
    pub(crate) fn claim(&self, kind: ObjectKind, id: &str) -> bool {
        self.inner.known.insert((kind, id.to_owned()))
    }

    pub(crate) fn release(&self, kind: ObjectKind, id: &str) {
        self.inner.known.remove(&(kind, id.to_owned()));
    }

    pub(crate) fn track(&self, handle: JoinHandle<()>) {
        let mut handles = self.inner.task_handles.lock().expect("task lock poisoned");
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }
}

fn heartbeat_expiry(device: &PduDevice, now: DateTime<Utc>) -> DateTime<Utc> {
    let interval = device
        .next_interval
        .unwrap_or(0)
        .clamp(0, MAX_INFORM_INTERVAL_SECS);
    now + chrono::Duration::seconds(interval + HEARTBEAT_GRACE_SECS)
}

/// Periodically sweep stale heartbeats until cancelled.
async fn heartbeat_task(session: Session, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                session.check_stale(Utc::now());
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.inner.config.url.as_str())
            .field("site", &self.inner.config.site)
            .field("available", &self.available())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::model::{DeviceState, MacAddress};

    fn device(next_interval: Option<i64>) -> PduDevice {
        PduDevice {
            id: "dev-1".into(),
            mac: MacAddress::new("aa:bb:cc:dd:ee:ff"),
            name: None,
            model: None,
            firmware_version: None,
            state: DeviceState::Online,
            disabled: false,
            next_interval,
            last_seen: None,
            outlet_overrides: Vec::new(),
        }
    }

    #[test]
    fn heartbeat_expiry_adds_grace_to_inform_interval() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("valid time");
        assert_eq!(
            heartbeat_expiry(&device(Some(30)), now),
            now + chrono::Duration::seconds(90)
        );
        assert_eq!(
            heartbeat_expiry(&device(None), now),
            now + chrono::Duration::seconds(60)
        );
        assert_eq!(
            heartbeat_expiry(&device(Some(-5)), now),
            now + chrono::Duration::seconds(60)
        );
    }

    #[test]
    fn heartbeat_expiry_bounds_absurd_intervals() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("valid time");
        for interval in [i64::MAX, i64::MAX / 2, i64::MAX - 30] {
            assert_eq!(
                heartbeat_expiry(&device(Some(interval)), now),
                now + chrono::Duration::seconds(86_400 + 60)
            );
        }
    }
}
