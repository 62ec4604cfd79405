//! WebSocket event stream.
//!
//! Connects to a UniFi controller's legacy WebSocket endpoint and streams
//! parsed events through a [`tokio::sync::broadcast`] channel. A handle
//! covers exactly one connection: when the socket drops, the stream state
//! flips to [`StreamState::Stopped`] and the owner decides whether (and when)
//! to log in again and open a fresh stream.
//!
//! # Example
//!
//! ```rust,ignore
//! use unipdu_api::websocket::WebSocketHandle;
//! use unipdu_api::TlsMode;
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let ws_url = Url::parse("wss://192.168.1.1/proxy/network/wss/s/default/events")?;
//! let handle = WebSocketHandle::connect(ws_url, CancellationToken::new(), cookie, &TlsMode::System)?;
//! let mut rx = handle.subscribe();
//!
//! while let Ok(event) = rx.recv().await {
//!     println!("{}: {}", event.key, event.message.as_deref().unwrap_or(""));
//! }
//!
//! handle.shutdown();
//! ```

use std::sync::Arc;

use futures_util::StreamExt;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio_tungstenite::Connector;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::transport::TlsMode;

// ── Broadcast channel capacity ───────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ── UnifiEvent ───────────────────────────────────────────────────────

/// A parsed event from the UniFi WebSocket stream.
///
/// Uses `#[serde(flatten)]` to capture all fields beyond the core set,
/// so nothing from the controller is silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiEvent {
    /// Event key, e.g. `"EVT_SW_Disconnected"`, or the message type
    /// (`"device:sync"`) for state dumps.
    pub key: String,

    /// Subsystem that emitted the event: `"wlan"`, `"lan"`, `"gw"`, etc.
    pub subsystem: String,

    /// Site ID this event belongs to.
    pub site_id: String,

    /// Human-readable event message, if present.
    #[serde(default)]
    pub message: Option<String>,

    /// ISO-8601 timestamp from the controller.
    #[serde(default)]
    pub datetime: Option<String>,

    /// All remaining fields the controller sends.
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

// ── StreamState ──────────────────────────────────────────────────────

/// Lifecycle of a single WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Running,
    /// The socket closed, failed, or was shut down. Terminal.
    Stopped,
}

// ── WebSocketHandle ──────────────────────────────────────────────────

/// Handle to a running WebSocket event stream.
///
/// Call [`shutdown`](Self::shutdown) to tear down the background task.
pub struct WebSocketHandle {
    event_rx: broadcast::Receiver<Arc<UnifiEvent>>,
    state_rx: watch::Receiver<StreamState>,
    cancel: CancellationToken,
}

impl WebSocketHandle {
    /// Spawn the connection task.
    ///
    /// Returns immediately once the background task is spawned; the
    /// handshake happens asynchronously. Watch [`state`](Self::state) to
    /// learn when the socket is up or gone.
    pub fn connect(
        ws_url: Url,
        cancel: CancellationToken,
        cookie: Option<String>,
        tls: &TlsMode,
    ) -> Result<Self, Error> {
        let connector = build_connector(tls)?;
        let (event_tx, event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(StreamState::Connecting);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                () = task_cancel.cancelled() => Ok(()),
                result = connect_and_read(&ws_url, &event_tx, &state_tx, cookie.as_deref(), connector) => result,
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "WebSocket stream failed");
            }
            let _ = state_tx.send(StreamState::Stopped);
            tracing::debug!("WebSocket task exiting");
        });

        Ok(Self {
            event_rx,
            state_rx,
            cancel,
        })
    }

    /// Get a new broadcast receiver for the event stream.
    ///
    /// Multiple consumers can subscribe concurrently. If a consumer falls
    /// behind, it receives [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<UnifiEvent>> {
        self.event_rx.resubscribe()
    }

    /// Observe the connection lifecycle.
    pub fn state(&self) -> watch::Receiver<StreamState> {
        self.state_rx.clone()
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish a single WebSocket connection, read messages until it drops.
///
/// If `cookie` is provided, it's injected as a `Cookie` header on the
/// WebSocket upgrade request (required for legacy cookie-based auth).
async fn connect_and_read(
    url: &Url,
    event_tx: &broadcast::Sender<Arc<UnifiEvent>>,
    state_tx: &watch::Sender<StreamState>,
    cookie: Option<&str>,
    connector: Option<Connector>,
) -> Result<(), Error> {
    tracing::info!(url = %url, "Connecting to WebSocket");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let mut request = ClientRequestBuilder::new(uri);
    if let Some(cookie_val) = cookie {
        request = request.with_header("Cookie", cookie_val);
    }

    let (ws_stream, _response) =
        tokio_tungstenite::connect_async_tls_with_config(request, None, false, connector)
            .await
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("WebSocket connected");
    let _ = state_tx.send(StreamState::Running);

    let (_write, mut read) = ws_stream.split();

    while let Some(frame) = read.next().await {
        match frame {
            Ok(tungstenite::Message::Text(text)) => {
                parse_and_broadcast(&text, event_tx);
            }
            Ok(tungstenite::Message::Ping(_)) => {
                // tungstenite handles pong replies automatically
                tracing::trace!("WebSocket ping");
            }
            Ok(tungstenite::Message::Close(frame)) => {
                if let Some(ref cf) = frame {
                    tracing::info!(
                        code = %cf.code,
                        reason = %cf.reason,
                        "WebSocket close frame received"
                    );
                } else {
                    tracing::info!("WebSocket close frame received (no payload)");
                }
                return Ok(());
            }
            Err(e) => return Err(Error::WebSocketConnect(e.to_string())),
            // Binary, Pong, Frame -- ignore
            Ok(_) => {}
        }
    }

    tracing::info!("WebSocket stream ended");
    Ok(())
}

// ── TLS ──────────────────────────────────────────────────────────────

/// Pick the rustls connector matching the HTTP client's TLS mode.
///
/// `System` uses tokio-tungstenite's bundled webpki roots.
fn build_connector(tls: &TlsMode) -> Result<Option<Connector>, Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?;

    let config = match tls {
        TlsMode::System => return Ok(None),
        TlsMode::CustomCa(path) => {
            let mut roots = RootCertStore::empty();
            let certs = CertificateDer::pem_file_iter(path)
                .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
            for cert in certs {
                let cert = cert.map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                roots
                    .add(cert)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
            }
            builder.with_root_certificates(roots).with_no_client_auth()
        }
        TlsMode::DangerAcceptInvalid => builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider)))
            .with_no_client_auth(),
    };

    Ok(Some(Connector::Rustls(Arc::new(config))))
}

/// Certificate verifier for self-signed controllers. Signatures are still
/// checked; only the chain of trust is skipped.
#[derive(Debug)]
struct AcceptAnyCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

// ── Message parsing ──────────────────────────────────────────────────

/// Raw envelope the controller sends over the WebSocket.
///
/// All messages have the shape `{ "meta": { "rc": "ok", ... }, "data": [...] }`.
#[derive(Debug, Deserialize)]
struct WsEnvelope {
    meta: WsMeta,
    data: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WsMeta {
    #[serde(default)]
    message: Option<String>,
}

/// Parse a WebSocket text frame and broadcast any events found inside.
fn parse_and_broadcast(text: &str, event_tx: &broadcast::Sender<Arc<UnifiEvent>>) {
    let envelope: WsEnvelope = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to parse WebSocket envelope");
            return;
        }
    };

    let msg_type = envelope.meta.message.as_deref().unwrap_or("");

    // Only "events" messages contain discrete events with a `key` field.
    // Sync messages ("device:sync", "device:update") are state dumps;
    // we surface them as events too, using the message type as the key.
    for data in envelope.data {
        let event = match msg_type {
            "events" => match serde_json::from_value::<UnifiEvent>(data.clone()) {
                Ok(evt) => evt,
                Err(e) => {
                    tracing::debug!(
                        error = %e,
                        msg_type,
                        "Could not deserialize event, constructing from raw data"
                    );
                    event_from_raw(msg_type, &data)
                }
            },
            _ => event_from_raw(msg_type, &data),
        };

        // Ignore send errors -- just means no active subscribers right now
        let _ = event_tx.send(Arc::new(event));
    }
}

/// Build a [`UnifiEvent`] from raw JSON when typed deserialization fails
/// or the message is a sync/unknown type.
fn event_from_raw(msg_type: &str, data: &serde_json::Value) -> UnifiEvent {
    let field = |name: &str| data.get(name).and_then(serde_json::Value::as_str);
    UnifiEvent {
        key: if msg_type == "events" {
            field("key").unwrap_or(msg_type).to_owned()
        } else {
            msg_type.to_owned()
        },
        subsystem: field("subsystem").unwrap_or("unknown").to_owned(),
        site_id: field("site_id").unwrap_or("").to_owned(),
        message: field("msg").or_else(|| field("message")).map(String::from),
        datetime: field("datetime").map(String::from),
        extra: data.clone(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parse_event_from_raw_json() {
        let data = serde_json::json!({
            "key": "EVT_SW_Disconnected",
            "subsystem": "lan",
            "site_id": "abc123",
            "msg": "PDU lost contact",
            "datetime": "2026-02-10T12:00:00Z",
            "sw": "aa:bb:cc:dd:ee:ff"
        });

        let event = event_from_raw("events", &data);
        assert_eq!(event.key, "EVT_SW_Disconnected");
        assert_eq!(event.subsystem, "lan");
        assert_eq!(event.site_id, "abc123");
        assert_eq!(event.message.as_deref(), Some("PDU lost contact"));
        assert_eq!(event.datetime.as_deref(), Some("2026-02-10T12:00:00Z"));
    }

    #[test]
    fn sync_frames_are_keyed_by_message_type() {
        let data = serde_json::json!({
            "mac": "aa:bb:cc:dd:ee:ff",
            "key": "ignored",
            "state": 1,
            "site_id": "site1"
        });

        let event = event_from_raw("device:sync", &data);
        assert_eq!(event.key, "device:sync");
        assert_eq!(event.subsystem, "unknown");
        assert_eq!(event.site_id, "site1");
        assert_eq!(event.extra["mac"], "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn parse_and_broadcast_events_message() {
        let (tx, mut rx) = broadcast::channel(16);

        let raw = serde_json::json!({
            "meta": { "rc": "ok", "message": "events" },
            "data": [{
                "key": "EVT_SW_Connected",
                "subsystem": "lan",
                "site_id": "default",
                "msg": "PDU connected",
                "sw": "aa:bb:cc:dd:ee:ff"
            }]
        });

        parse_and_broadcast(&raw.to_string(), &tx);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.key, "EVT_SW_Connected");
        assert_eq!(event.extra["sw"], "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn parse_and_broadcast_device_sync_keeps_payload() {
        let (tx, mut rx) = broadcast::channel(16);

        let raw = serde_json::json!({
            "meta": { "rc": "ok", "message": "device:sync" },
            "data": [{
                "_id": "dev1",
                "mac": "aa:bb:cc:dd:ee:ff",
                "outlet_table": [{ "index": 1, "relay_state": true }]
            }]
        });

        parse_and_broadcast(&raw.to_string(), &tx);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.key, "device:sync");
        assert_eq!(event.extra["outlet_table"][0]["relay_state"], true);
    }

    #[test]
    fn parse_and_broadcast_malformed_json() {
        let (tx, mut rx) = broadcast::channel::<Arc<UnifiEvent>>(16);

        parse_and_broadcast("not json at all", &tx);

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn system_tls_uses_default_connector() {
        assert!(build_connector(&TlsMode::System).unwrap().is_none());
        assert!(
            build_connector(&TlsMode::DangerAcceptInvalid)
                .unwrap()
                .is_some()
        );
    }
}
