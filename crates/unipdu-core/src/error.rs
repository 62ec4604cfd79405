// ── Core error types ──
//
// User-facing errors from unipdu-core. These are NOT API-specific --
// consumers never see HTTP status codes or JSON parse failures directly.
// The `From<unipdu_api::Error>` impl translates transport-layer errors
// into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to controller at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Controller disconnected")]
    ControllerDisconnected,

    #[error("Controller connection timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    #[error("Outlet not found: {identifier}")]
    OutletNotFound { identifier: String },

    #[error("Site not found: {name}")]
    SiteNotFound { name: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    /// The controller answered with something that is not a valid
    /// response (non-JSON body, unexpected shape).
    #[error("Invalid controller response: {message}")]
    InvalidResponse { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Collapse any error into one of the two kinds a host sees during
    /// initial setup: [`ConnectionFailed`](Self::ConnectionFailed) or
    /// [`AuthenticationFailed`](Self::AuthenticationFailed).
    ///
    /// Unrecognized protocols and controller error codes count as
    /// authentication problems; the network, a busy controller or a
    /// malformed response body count as connection problems.
    pub fn into_setup_kind(self, url: &str) -> Self {
        match self {
            Self::ConnectionFailed { .. } | Self::AuthenticationFailed { .. } => self,
            Self::Timeout { timeout_secs } => Self::ConnectionFailed {
                url: url.to_owned(),
                reason: format!("timed out after {timeout_secs}s"),
            },
            Self::ControllerDisconnected => Self::ConnectionFailed {
                url: url.to_owned(),
                reason: "controller disconnected".into(),
            },
            Self::InvalidResponse { message } => Self::ConnectionFailed {
                url: url.to_owned(),
                reason: format!("invalid response: {message}"),
            },
            Self::Api {
                message,
                status: Some(status),
            } => Self::ConnectionFailed {
                url: url.to_owned(),
                reason: format!("HTTP {status}: {message}"),
            },
            other => Self::AuthenticationFailed {
                message: other.to_string(),
            },
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<unipdu_api::Error> for CoreError {
    fn from(err: unipdu_api::Error) -> Self {
        match err {
            unipdu_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            unipdu_api::Error::LoginRequired => CoreError::AuthenticationFailed {
                message: "Login required -- session is not authenticated".into(),
            },
            unipdu_api::Error::UnknownProtocol(detail) => CoreError::AuthenticationFailed {
                message: format!("Unrecognized controller response: {detail}"),
            },
            unipdu_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map(|u| u.to_string())
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                }
            }
            unipdu_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            unipdu_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            unipdu_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            unipdu_api::Error::BadGateway => CoreError::ConnectionFailed {
                url: String::new(),
                reason: "bad gateway (HTTP 502)".into(),
            },
            unipdu_api::Error::ServiceUnavailable => CoreError::ConnectionFailed {
                url: String::new(),
                reason: "service unavailable (HTTP 503)".into(),
            },
            unipdu_api::Error::Response { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            unipdu_api::Error::LegacyApi { message } => CoreError::Api {
                message,
                status: None,
            },
            unipdu_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            unipdu_api::Error::Deserialization { message, body: _ } => {
                CoreError::InvalidResponse { message }
            }
        }
    }
}

// ── Host setup errors ────────────────────────────────────────────────

/// Why a config entry could not be set up.
///
/// Hosts map these to "retry setup later" and "re-authenticate" flows.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Controller not ready: {0}")]
    NotReady(#[source] CoreError),

    #[error("Controller rejected credentials: {0}")]
    AuthFailed(#[source] CoreError),
}

impl From<CoreError> for SetupError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::AuthenticationFailed { .. } => Self::AuthFailed(err),
            other => Self::NotReady(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_errors_are_connection_failures() {
        for err in [
            unipdu_api::Error::BadGateway,
            unipdu_api::Error::ServiceUnavailable,
            unipdu_api::Error::Timeout { timeout_secs: 10 },
        ] {
            let core = CoreError::from(err).into_setup_kind("https://pdu.local");
            assert!(
                matches!(core, CoreError::ConnectionFailed { .. }),
                "got: {core:?}"
            );
        }
    }

    #[test]
    fn login_required_is_an_auth_failure() {
        let core = CoreError::from(unipdu_api::Error::LoginRequired);
        assert!(matches!(
            SetupError::from(core),
            SetupError::AuthFailed(_)
        ));
    }

    #[test]
    fn unrecognized_responses_are_auth_failures() {
        let core = CoreError::from(unipdu_api::Error::LegacyApi {
            message: "api.err.Invalid".into(),
        })
        .into_setup_kind("https://pdu.local");
        assert!(matches!(core, CoreError::AuthenticationFailed { .. }));

        let core = CoreError::from(unipdu_api::Error::UnknownProtocol("?".into()));
        assert!(matches!(core, CoreError::AuthenticationFailed { .. }));
    }

    #[test]
    fn malformed_responses_mean_retry_later() {
        let core = CoreError::from(unipdu_api::Error::Deserialization {
            message: "expected value at line 1 column 1".into(),
            body: "<html>proxy error</html>".into(),
        });
        assert!(matches!(core, CoreError::InvalidResponse { .. }));

        let core = core.into_setup_kind("https://pdu.local");
        assert!(matches!(core, CoreError::ConnectionFailed { .. }), "got: {core:?}");
        assert!(matches!(SetupError::from(core), SetupError::NotReady(_)));
    }

    #[test]
    fn http_status_errors_are_connection_failures() {
        let core = CoreError::from(unipdu_api::Error::Response {
            status: 500,
            message: "boom".into(),
        })
        .into_setup_kind("https://pdu.local");
        assert!(matches!(core, CoreError::ConnectionFailed { .. }));
        assert!(matches!(SetupError::from(core), SetupError::NotReady(_)));
    }
}
