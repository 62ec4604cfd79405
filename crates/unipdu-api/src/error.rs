use thiserror::Error;

/// Top-level error type for the `unipdu-api` crate.
///
/// Covers every failure mode of the surfaces the PDU session talks to:
/// authentication, transport, the legacy envelope API, and the WebSocket.
/// `unipdu-core` folds these into its connect/auth taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login failed or the controller rejected the session (HTTP 401).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The controller answered but demands a fresh login
    /// (`api.err.LoginRequired` in the legacy envelope).
    #[error("Login required")]
    LoginRequired,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The controller's reverse proxy could not reach the Network app (HTTP 502).
    #[error("Bad gateway (HTTP 502)")]
    BadGateway,

    /// The Network app is starting up or overloaded (HTTP 503).
    #[error("Service unavailable (HTTP 503)")]
    ServiceUnavailable,

    /// Any other non-success HTTP status.
    #[error("Unexpected response (HTTP {status}): {message}")]
    Response { status: u16, message: String },

    // ── Legacy API ──────────────────────────────────────────────────
    /// Error from the legacy API (parsed from the `{meta: {rc, msg}}` envelope).
    #[error("Legacy API error: {message}")]
    LegacyApi { message: String },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// The endpoint answered in a way no known controller platform does.
    #[error("Unrecognized controller protocol: {0}")]
    UnknownProtocol(String),
}

impl Error {
    /// Returns `true` if this error indicates auth has expired
    /// and re-authentication might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::LoginRequired)
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. }
            | Self::BadGateway
            | Self::ServiceUnavailable
            | Self::WebSocketConnect(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Response { status: 404, .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_errors_are_transient() {
        assert!(Error::BadGateway.is_transient());
        assert!(Error::ServiceUnavailable.is_transient());
        assert!(Error::Timeout { timeout_secs: 5 }.is_transient());
        assert!(!Error::LoginRequired.is_transient());
    }

    #[test]
    fn login_required_counts_as_expired_auth() {
        assert!(Error::LoginRequired.is_auth_expired());
        assert!(
            Error::Authentication {
                message: "nope".into()
            }
            .is_auth_expired()
        );
        assert!(!Error::BadGateway.is_auth_expired());
    }
}
