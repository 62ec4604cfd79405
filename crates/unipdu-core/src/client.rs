// ── Controller client seam ──
//
// The session talks to the controller only through `ControllerClient`.
// `LegacyControllerClient` is the real implementation over the legacy
// HTTP API and the WebSocket event stream; tests script their own.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use unipdu_api::legacy::models::{LegacyDevice, LegacySite, OutletOverride, SiteDescription};
use unipdu_api::{
    ControllerPlatform, Error, LegacyClient, StreamState, TlsMode, UnifiEvent, WebSocketHandle,
};

use crate::config::SessionConfig;
use crate::error::CoreError;
use crate::model::{MacAddress, PduDevice};

// ── Requests ─────────────────────────────────────────────────────────

/// A state-changing request against a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRequest {
    /// Switch one outlet relay by rewriting the device's override list.
    SetOutletRelay {
        /// Controller object id (`_id`) of the device.
        device_id: String,
        device_mac: MacAddress,
        index: u32,
        relay_state: bool,
        /// Full override list to send, with `index` already set.
        outlet_overrides: Vec<OutletOverride>,
    },
}

impl DeviceRequest {
    pub fn set_outlet_relay(device: &PduDevice, index: u32, name: &str, relay_state: bool) -> Self {
        Self::SetOutletRelay {
            device_id: device.id.clone(),
            device_mac: device.mac.clone(),
            index,
            relay_state,
            outlet_overrides: device.overrides_with_relay(index, name, relay_state),
        }
    }
}

// ── Event stream ─────────────────────────────────────────────────────

/// Receivers for one push-event stream connection.
pub struct EventStream {
    pub events: broadcast::Receiver<Arc<UnifiEvent>>,
    pub state: watch::Receiver<StreamState>,
}

// ── ControllerClient ─────────────────────────────────────────────────

/// Everything the session needs from a controller.
#[async_trait]
pub trait ControllerClient: Send + Sync {
    /// Detect which controller platform answers at the configured URL.
    async fn check_protocol(&self) -> Result<ControllerPlatform, Error>;

    /// Authenticate with the configured credentials.
    async fn login(&self) -> Result<(), Error>;

    async fn sites(&self) -> Result<Vec<LegacySite>, Error>;

    async fn site_description(&self) -> Result<Vec<SiteDescription>, Error>;

    async fn devices(&self) -> Result<Vec<LegacyDevice>, Error>;

    async fn request(&self, request: DeviceRequest) -> Result<(), Error>;

    /// Open a fresh push-event stream, replacing any previous one.
    fn start_event_stream(&self) -> Result<EventStream, Error>;

    fn stop_event_stream(&self);
}

// ── LegacyControllerClient ───────────────────────────────────────────

/// [`ControllerClient`] over the legacy cookie-authenticated API.
pub struct LegacyControllerClient {
    legacy: LegacyClient,
    username: String,
    password: SecretString,
    tls: TlsMode,
    cancel: CancellationToken,
    ws_handle: Mutex<Option<WebSocketHandle>>,
}

impl LegacyControllerClient {
    pub fn new(config: &SessionConfig) -> Result<Self, CoreError> {
        let transport = config.transport();
        let legacy = LegacyClient::new(
            config.url.clone(),
            config.site.clone(),
            ControllerPlatform::UnifiOs,
            &transport,
        )?;

        Ok(Self {
            legacy,
            username: config.username.clone(),
            password: config.password.clone(),
            tls: transport.tls,
            cancel: CancellationToken::new(),
            ws_handle: Mutex::new(None),
        })
    }
}

#[async_trait]
impl ControllerClient for LegacyControllerClient {
    async fn check_protocol(&self) -> Result<ControllerPlatform, Error> {
        self.legacy.check_unifi_os().await
    }

    async fn login(&self) -> Result<(), Error> {
        self.legacy.login(&self.username, &self.password).await
    }

    async fn sites(&self) -> Result<Vec<LegacySite>, Error> {
        self.legacy.list_sites().await
    }

    async fn site_description(&self) -> Result<Vec<SiteDescription>, Error> {
        self.legacy.site_description().await
    }

    async fn devices(&self) -> Result<Vec<LegacyDevice>, Error> {
        self.legacy.list_devices().await
    }

    async fn request(&self, request: DeviceRequest) -> Result<(), Error> {
        match request {
            DeviceRequest::SetOutletRelay {
                device_id,
                index,
                relay_state,
                outlet_overrides,
                ..
            } => {
                debug!(device_id, index, relay_state, "setting outlet relay");
                self.legacy
                    .set_outlet_overrides(&device_id, &outlet_overrides)
                    .await
            }
        }
    }

    fn start_event_stream(&self) -> Result<EventStream, Error> {
        self.stop_event_stream();

        let ws_url = self.legacy.websocket_url()?;
        let cookie = self.legacy.cookie_header();
        if cookie.is_none() {
            warn!("no session cookie -- WebSocket upgrade will likely be rejected");
        }

        let handle = WebSocketHandle::connect(ws_url, self.cancel.child_token(), cookie, &self.tls)?;
        let stream = EventStream {
            events: handle.subscribe(),
            state: handle.state(),
        };
        *self.ws_handle.lock().expect("ws handle lock poisoned") = Some(handle);
        Ok(stream)
    }

    fn stop_event_stream(&self) {
        if let Some(handle) = self.ws_handle.lock().expect("ws handle lock poisoned").take() {
            handle.shutdown();
        }
    }
}

impl Drop for LegacyControllerClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
