// Legacy API HTTP client
//
// Wraps `reqwest::Client` with UniFi-specific URL construction, envelope
// unwrapping, and platform-aware path prefixing. Endpoint groups (auth,
// sites, devices) are implemented as inherent methods in sibling files to
// keep this module focused on transport mechanics.

use std::sync::{Arc, RwLock};

use reqwest::StatusCode;
use reqwest::cookie::{CookieStore, Jar};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::auth::ControllerPlatform;
use crate::error::Error;
use crate::legacy::models::LegacyResponse;
use crate::transport::TransportConfig;

/// Envelope message the controller uses when the session cookie is gone.
const LOGIN_REQUIRED_MSG: &str = "api.err.LoginRequired";

/// UniFi OS wraps some errors as `{"error":{"code":N,"message":"..."}}` with HTTP 200.
#[derive(serde::Deserialize)]
struct UnifiOsError {
    error: Option<UnifiOsErrorInner>,
}

#[derive(serde::Deserialize)]
struct UnifiOsErrorInner {
    code: u16,
    message: Option<String>,
}

/// Raw HTTP client for the UniFi controller's legacy API.
///
/// Handles the `{ data: [], meta: { rc, msg } }` envelope, site-scoped
/// URL construction, and platform-aware path prefixing. All methods return
/// unwrapped `data` payloads -- the envelope is stripped before the caller
/// sees it.
pub struct LegacyClient {
    http: reqwest::Client,
    base_url: Url,
    site: String,
    platform: RwLock<ControllerPlatform>,
    /// CSRF token for UniFi OS. Required on all POST/PUT/DELETE requests
    /// through the `/proxy/network/` path. Captured from login response
    /// headers and rotated via `X-Updated-CSRF-Token`.
    csrf_token: RwLock<Option<String>>,
    /// Cookie jar reference for extracting session cookies (e.g. for WebSocket auth).
    cookie_jar: Option<Arc<Jar>>,
}

impl LegacyClient {
    /// Create a new legacy client from a `TransportConfig`.
    ///
    /// If the config doesn't already include a cookie jar, one is created
    /// automatically (legacy auth requires cookies). The `base_url` should be
    /// the controller root (e.g. `https://192.168.1.1` for UniFi OS or
    /// `https://controller:8443` for standalone).
    pub fn new(
        base_url: Url,
        site: String,
        platform: ControllerPlatform,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let config = if transport.cookie_jar.is_some() {
            transport.clone()
        } else {
            transport.clone().with_cookie_jar()
        };
        let cookie_jar = config.cookie_jar.clone();
        let http = config.build_client()?;
        Ok(Self {
            http,
            base_url,
            site,
            platform: RwLock::new(platform),
            csrf_token: RwLock::new(None),
            cookie_jar,
        })
    }

    /// Create a legacy client with a pre-built `reqwest::Client`.
    ///
    /// Use this when you already have a client with a session cookie in its
    /// jar, or in tests against a mock server.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        site: String,
        platform: ControllerPlatform,
    ) -> Self {
        Self {
            http,
            base_url,
            site,
            platform: RwLock::new(platform),
            csrf_token: RwLock::new(None),
            cookie_jar: None,
        }
    }

    /// The current site identifier.
    pub fn site(&self) -> &str {
        &self.site
    }

    /// The underlying HTTP client (for auth flows that need direct access).
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The controller base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The detected controller platform.
    pub fn platform(&self) -> ControllerPlatform {
        *self.platform.read().expect("platform lock poisoned")
    }

    /// Replace the platform after a fresh detection.
    pub(crate) fn set_platform(&self, platform: ControllerPlatform) {
        *self.platform.write().expect("platform lock poisoned") = platform;
    }

    /// Extract the session cookie header value for WebSocket auth.
    ///
    /// Returns the `Cookie` header string (e.g. `"TOKEN=abc123"`) if a
    /// cookie jar is available and contains cookies for the controller URL.
    pub fn cookie_header(&self) -> Option<String> {
        let jar = self.cookie_jar.as_ref()?;
        let cookies = jar.cookies(&self.base_url)?;
        cookies.to_str().ok().map(String::from)
    }

    /// Build the WebSocket events URL for the current site and platform.
    pub fn websocket_url(&self) -> Result<Url, Error> {
        let path = self
            .platform()
            .websocket_path()
            .replace("{site}", &self.site);
        let mut url = self.base_url.join(&path)?;
        let scheme = if self.base_url.scheme() == "https" {
            "wss"
        } else {
            "ws"
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::UnknownProtocol(format!("cannot use {scheme} for {url}")))?;
        Ok(url)
    }

    // ── CSRF token management ─────────────────────────────────────────

    /// Store a CSRF token (captured from login response headers).
    pub(crate) fn set_csrf_token(&self, token: String) {
        debug!("storing CSRF token");
        *self.csrf_token.write().expect("CSRF lock poisoned") = Some(token);
    }

    /// Update CSRF token if the response contains a rotated value.
    fn update_csrf_from_response(&self, headers: &reqwest::header::HeaderMap) {
        // UniFi OS may rotate tokens; prefer the updated one.
        let new_token = headers
            .get("X-Updated-CSRF-Token")
            .or_else(|| headers.get("x-csrf-token"))
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        if let Some(token) = new_token {
            trace!("CSRF token rotated");
            *self.csrf_token.write().expect("CSRF lock poisoned") = Some(token);
        }
    }

    /// Apply the stored CSRF token to a request builder.
    fn apply_csrf(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let guard = self.csrf_token.read().expect("CSRF lock poisoned");
        match guard.as_deref() {
            Some(token) => builder.header("X-CSRF-Token", token),
            None => builder,
        }
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build a full URL for a controller-level API path.
    ///
    /// Applies the platform-specific legacy prefix, then appends `/api/{path}`.
    /// For example, on UniFi OS: `https://host/proxy/network/api/{path}`
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let prefix = self.platform().legacy_prefix().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}{prefix}/api/{path}"))?)
    }

    /// Build a site-scoped URL: `{base}{prefix}/api/s/{site}/{path}`
    pub(crate) fn site_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let prefix = self.platform().legacy_prefix().trim_end_matches('/');
        Ok(Url::parse(&format!(
            "{base}{prefix}/api/s/{}/{path}",
            self.site
        ))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a GET request and unwrap the legacy envelope.
    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<Vec<T>, Error> {
        debug!("GET {}", url);

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;

        self.parse_envelope(resp).await
    }

    /// Send a PUT request with JSON body and unwrap the legacy envelope.
    pub(crate) async fn put<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &(impl Serialize + Sync),
    ) -> Result<Vec<T>, Error> {
        debug!("PUT {}", url);

        let builder = self.apply_csrf(self.http.put(url).json(body));
        let resp = builder.send().await.map_err(Error::Transport)?;

        self.parse_envelope(resp).await
    }

    /// Parse the `{ meta, data }` envelope, returning `data` on success.
    ///
    /// Also handles UniFi OS error responses that use a different shape:
    /// `{"error": {"code": 403, "message": "..."}}` (returned with HTTP 200).
    async fn parse_envelope<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<Vec<T>, Error> {
        let status = resp.status();

        // Capture any CSRF token rotation before consuming the response.
        self.update_csrf_from_response(resp.headers());

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body = resp.text().await.map_err(Error::Transport)?;

        // UniFi OS sometimes returns `{"error":{"code":N,"message":"..."}}` with HTTP 200.
        if let Ok(wrapper) = serde_json::from_str::<UnifiOsError>(&body) {
            if let Some(err) = wrapper.error {
                let msg = err.message.unwrap_or_default();
                return Err(if err.code == 401 {
                    Error::Authentication { message: msg }
                } else {
                    Error::LegacyApi {
                        message: format!("UniFi OS error {}: {msg}", err.code),
                    }
                });
            }
        }

        let envelope: LegacyResponse<T> = serde_json::from_str(&body).map_err(|e| {
            let snippet = preview(&body);
            Error::Deserialization {
                message: format!("{e} (body preview: {snippet:?})"),
                body: body.clone(),
            }
        })?;

        match envelope.meta.rc.as_str() {
            "ok" => Ok(envelope.data),
            _ => {
                let message = envelope
                    .meta
                    .msg
                    .unwrap_or_else(|| format!("rc={}", envelope.meta.rc));
                if message == LOGIN_REQUIRED_MSG {
                    Err(Error::LoginRequired)
                } else {
                    Err(Error::LegacyApi { message })
                }
            }
        }
    }
}

/// At most the first 200 characters of a response body.
fn preview(body: &str) -> &str {
    body.char_indices()
        .nth(200)
        .map_or(body, |(end, _)| &body[..end])
}

/// Map a non-success HTTP status to the matching error variant.
pub(crate) fn status_error(status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED => {
            if body.contains(LOGIN_REQUIRED_MSG) {
                Error::LoginRequired
            } else {
                Error::Authentication {
                    message: "session expired or invalid credentials".into(),
                }
            }
        }
        StatusCode::FORBIDDEN => Error::LegacyApi {
            message: "insufficient permissions (HTTP 403)".into(),
        },
        StatusCode::BAD_GATEWAY => Error::BadGateway,
        StatusCode::SERVICE_UNAVAILABLE => Error::ServiceUnavailable,
        _ => Error::Response {
            status: status.as_u16(),
            message: preview(body).to_owned(),
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str, platform: ControllerPlatform) -> LegacyClient {
        LegacyClient::with_client(
            reqwest::Client::new(),
            Url::parse(base).unwrap(),
            "default".into(),
            platform,
        )
    }

    #[test]
    fn site_url_applies_unifi_os_prefix() {
        let c = client("https://10.0.0.1", ControllerPlatform::UnifiOs);
        assert_eq!(
            c.site_url("stat/device").unwrap().as_str(),
            "https://10.0.0.1/proxy/network/api/s/default/stat/device"
        );
        assert_eq!(
            c.api_url("self/sites").unwrap().as_str(),
            "https://10.0.0.1/proxy/network/api/self/sites"
        );
    }

    #[test]
    fn websocket_url_switches_scheme() {
        let c = client("https://10.0.0.1:8443", ControllerPlatform::ClassicController);
        assert_eq!(
            c.websocket_url().unwrap().as_str(),
            "wss://10.0.0.1:8443/wss/s/default/events"
        );
    }

    #[test]
    fn error_previews_stop_on_a_char_boundary() {
        let body = format!("{}é{}", "x".repeat(199), "…".repeat(50));
        match status_error(StatusCode::INTERNAL_SERVER_ERROR, &body) {
            Error::Response { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message.chars().count(), 200);
                assert!(message.ends_with('é'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn status_errors_map_gateway_failures() {
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, ""),
            Error::BadGateway
        ));
        assert!(matches!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, ""),
            Error::ServiceUnavailable
        ));
        assert!(matches!(
            status_error(
                StatusCode::UNAUTHORIZED,
                r#"{"meta":{"rc":"error","msg":"api.err.LoginRequired"}}"#
            ),
            Error::LoginRequired
        ));
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "nope"),
            Error::Response { status: 404, .. }
        ));
    }
}
