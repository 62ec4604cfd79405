// Scripted controller shared by the session and entity tests.
#![allow(clippy::unwrap_used, dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::json;
use tokio::sync::{Notify, broadcast, mpsc, watch};
use tokio::time::Instant;

use unipdu_api::legacy::models::{LegacyDevice, LegacySite, SiteDescription};
use unipdu_api::{ControllerPlatform, Error, StreamState, UnifiEvent};
use unipdu_core::{
    AddEntities, ConfigEntry, ControllerClient, DeviceRequest, EntityStateChanged, EntryData,
    EntryOptions, EventStream, SwitchEntity, TlsVerification,
};

pub const PDU_MAC: &str = "aa:bb:cc:dd:ee:ff";

struct StreamSenders {
    events: broadcast::Sender<Arc<UnifiEvent>>,
    state: watch::Sender<StreamState>,
}

/// A controller whose every answer is set up by the test.
#[derive(Default)]
pub struct MockClient {
    pub platform_error: Mutex<Option<fn() -> Error>>,
    pub platform_hangs: AtomicBool,
    pub login_error: Mutex<Option<fn() -> Error>>,
    /// Remaining logins that fail with `login_error`.
    pub login_failures: AtomicUsize,
    pub login_times: Mutex<Vec<Instant>>,
    pub sites: Mutex<Vec<LegacySite>>,
    pub devices: Mutex<Vec<LegacyDevice>>,
    pub request_error: Mutex<Option<fn() -> Error>>,
    pub requests: Mutex<Vec<DeviceRequest>>,
    /// While set, requests are recorded and then wait for `release_requests`.
    pub hold_requests: AtomicBool,
    pub release_requests: Notify,
    pub stream_starts: AtomicUsize,
    stream: Mutex<Option<StreamSenders>>,
}

impl MockClient {
    pub fn with_devices(devices: Vec<LegacyDevice>) -> Arc<Self> {
        let client = Self::default();
        *client.sites.lock().unwrap() = vec![site("default")];
        *client.devices.lock().unwrap() = devices;
        Arc::new(client)
    }

    pub fn login_count(&self) -> usize {
        self.login_times.lock().unwrap().len()
    }

    /// Fail the next `n` logins with `error`.
    pub fn fail_logins(&self, n: usize, error: fn() -> Error) {
        *self.login_error.lock().unwrap() = Some(error);
        self.login_failures.store(n, Ordering::SeqCst);
    }

    /// Push one frame down the current event stream.
    pub fn push(&self, event: UnifiEvent) {
        let guard = self.stream.lock().unwrap();
        let senders = guard.as_ref().expect("event stream not started");
        let _ = senders.events.send(Arc::new(event));
    }

    pub fn push_device_sync(&self, device: &LegacyDevice) {
        self.push(UnifiEvent {
            key: "device:sync".into(),
            subsystem: String::new(),
            site_id: "site-default".into(),
            message: None,
            datetime: None,
            extra: serde_json::to_value(device).unwrap(),
        });
    }

    pub fn push_event(&self, key: &str, mac: &str) {
        self.push(UnifiEvent {
            key: key.into(),
            subsystem: "lan".into(),
            site_id: "site-default".into(),
            message: Some(format!("{key} on {mac}")),
            datetime: None,
            extra: json!({ "mac": mac }),
        });
    }

    /// Simulate the controller dropping the socket.
    pub fn drop_stream(&self) {
        if let Some(senders) = self.stream.lock().unwrap().as_ref() {
            senders.state.send_replace(StreamState::Stopped);
        }
    }
}

#[async_trait]
impl ControllerClient for MockClient {
    async fn check_protocol(&self) -> Result<ControllerPlatform, Error> {
        if self.platform_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        match *self.platform_error.lock().unwrap() {
            Some(error) => Err(error()),
            None => Ok(ControllerPlatform::UnifiOs),
        }
    }

    async fn login(&self) -> Result<(), Error> {
        self.login_times.lock().unwrap().push(Instant::now());
        let failing = self
            .login_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        match (failing, *self.login_error.lock().unwrap()) {
            (true, Some(error)) => Err(error()),
            _ => Ok(()),
        }
    }

    async fn sites(&self) -> Result<Vec<LegacySite>, Error> {
        Ok(self.sites.lock().unwrap().clone())
    }

    async fn site_description(&self) -> Result<Vec<SiteDescription>, Error> {
        Ok(vec![
            serde_json::from_value(json!({ "site_role": "admin", "name": "default" })).unwrap(),
        ])
    }

    async fn devices(&self) -> Result<Vec<LegacyDevice>, Error> {
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn request(&self, request: DeviceRequest) -> Result<(), Error> {
        self.requests.lock().unwrap().push(request);
        if self.hold_requests.load(Ordering::SeqCst) {
            self.release_requests.notified().await;
        }
        match *self.request_error.lock().unwrap() {
            Some(error) => Err(error()),
            None => Ok(()),
        }
    }

    fn start_event_stream(&self) -> Result<EventStream, Error> {
        self.stream_starts.fetch_add(1, Ordering::SeqCst);
        let (events, events_rx) = broadcast::channel(64);
        let (state, state_rx) = watch::channel(StreamState::Running);
        *self.stream.lock().unwrap() = Some(StreamSenders { events, state });
        Ok(EventStream {
            events: events_rx,
            state: state_rx,
        })
    }

    fn stop_event_stream(&self) {
        self.stream.lock().unwrap().take();
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────

pub fn site(name: &str) -> LegacySite {
    serde_json::from_value(json!({
        "_id": format!("site-{name}"),
        "name": name,
        "desc": "Default",
        "role": "admin",
    }))
    .unwrap()
}

/// A SmartPower PDU with `(index, relay_state)` outlets.
pub fn pdu(mac: &str, outlets: &[(u32, bool)]) -> LegacyDevice {
    let table: Vec<serde_json::Value> = outlets
        .iter()
        .map(|(index, on)| {
            json!({ "index": index, "name": format!("Port {index}"), "relay_state": on, "has_relay": true })
        })
        .collect();
    serde_json::from_value(json!({
        "_id": format!("dev-{mac}"),
        "mac": mac,
        "type": "usp",
        "model": "USPPDUP",
        "name": "Rack PDU",
        "state": 1,
        "next_interval": 30,
        "outlet_table": table,
        "outlet_overrides": [],
    }))
    .unwrap()
}

pub fn entry(options: EntryOptions) -> ConfigEntry {
    ConfigEntry {
        entry_id: "test".into(),
        data: EntryData {
            host: "https://pdu.test".parse().unwrap(),
            username: "admin".into(),
            password: SecretString::from("secret".to_string()),
            site: "default".into(),
            tls: TlsVerification::SystemDefaults,
            timeout: Duration::from_secs(30),
        },
        options,
    }
}

/// An `AddEntities` callback that forwards every batch to a channel.
pub fn collector() -> (AddEntities, mpsc::UnboundedReceiver<Vec<SwitchEntity>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let add: AddEntities = Arc::new(move |entities| {
        let _ = tx.send(entities);
    });
    (add, rx)
}

/// Wait for the next state notification of `unique_id` matching `pred`.
pub async fn next_update(
    rx: &mut broadcast::Receiver<EntityStateChanged>,
    unique_id: &str,
    pred: impl Fn(&EntityStateChanged) -> bool,
) -> EntityStateChanged {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            let update = rx.recv().await.unwrap();
            if update.unique_id == unique_id && pred(&update) {
                return update;
            }
        }
    })
    .await
    .expect("no matching entity update")
}
