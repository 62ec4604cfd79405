// ── Runtime connection configuration ──
//
// These types describe *how* to connect to a PDU controller and how the
// integration behaves once connected. They carry credential data and
// connection tuning, but never touch disk. `unipdu-config` builds a
// `ConfigEntry` from profiles and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use unipdu_api::{TlsMode, TransportConfig};

/// Default site name on every controller.
pub const DEFAULT_SITE: &str = "default";

/// TLS verification strategy.
///
/// Verification is on unless an operator explicitly opts out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed certs). Explicit opt-in only.
    DangerAcceptInvalid,
}

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        }
    }
}

// ── Config entry ─────────────────────────────────────────────────────

/// One configured controller: what the host hands to
/// [`Integration::setup`](crate::Integration::setup).
#[derive(Debug, Clone)]
pub struct ConfigEntry {
    /// Stable identifier for this entry (profile name in the CLI).
    pub entry_id: String,
    pub data: EntryData,
    pub options: EntryOptions,
}

/// Connection data for a config entry. Changing it requires a new setup.
#[derive(Debug, Clone)]
pub struct EntryData {
    /// Controller URL (e.g., `https://192.168.1.1`).
    pub host: Url,
    pub username: String,
    pub password: SecretString,
    /// Site to operate on (defaults to "default").
    pub site: String,
    pub tls: TlsVerification,
    /// HTTP request timeout.
    pub timeout: Duration,
}

/// Runtime-adjustable behaviour. Updated through
/// [`Integration::update_options`](crate::Integration::update_options).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryOptions {
    /// Outlet ids (`{mac}_{index}`) that should not become entities.
    pub excluded_outlets: Vec<String>,
    /// Controller event keys that carry outlet state.
    pub event_keys: Vec<String>,
    /// Subset of `event_keys` meaning "now on".
    pub event_is_on_keys: Vec<String>,
    /// How often tracked heartbeats are checked for staleness.
    pub heartbeat_interval: Duration,
    /// Fixed wait between failed reconnect attempts.
    pub reconnect_delay: Duration,
}

impl Default for EntryOptions {
    fn default() -> Self {
        Self {
            excluded_outlets: Vec::new(),
            event_keys: Vec::new(),
            event_is_on_keys: Vec::new(),
            heartbeat_interval: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(15),
        }
    }
}

// ── Session tuning ───────────────────────────────────────────────────

/// Everything a [`Session`](crate::Session) needs to run.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub url: Url,
    pub username: String,
    pub password: SecretString,
    pub site: String,
    pub tls: TlsVerification,
    /// HTTP request timeout.
    pub timeout: Duration,
    /// Upper bound on the initial platform check + login.
    pub connect_timeout: Duration,
    /// Upper bound on a single reconnect attempt (login + stream restart).
    pub reconnect_timeout: Duration,
    /// Fixed delay between failed reconnect attempts.
    pub reconnect_delay: Duration,
    /// Heartbeat staleness sweep period.
    pub heartbeat_interval: Duration,
}

impl SessionConfig {
    /// Build a config with the stock timings for `url`.
    pub fn new(url: Url, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            url,
            username: username.into(),
            password,
            site: DEFAULT_SITE.into(),
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            reconnect_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(15),
            heartbeat_interval: Duration::from_secs(1),
        }
    }

    /// Transport settings for the HTTP client and event stream.
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: TlsMode::from(&self.tls),
            timeout: self.timeout,
            cookie_jar: None,
        }
    }
}

impl From<&ConfigEntry> for SessionConfig {
    fn from(entry: &ConfigEntry) -> Self {
        let mut config = Self::new(
            entry.data.host.clone(),
            entry.data.username.clone(),
            entry.data.password.clone(),
        );
        config.site.clone_from(&entry.data.site);
        config.tls = entry.data.tls.clone();
        config.timeout = entry.data.timeout;
        config.reconnect_delay = entry.options.reconnect_delay;
        config.heartbeat_interval = entry.options.heartbeat_interval;
        config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tls_verification_defaults_to_strict() {
        assert_eq!(TlsVerification::default(), TlsVerification::SystemDefaults);
        let config = SessionConfig::new(
            "https://pdu.local".parse().unwrap(),
            "admin",
            SecretString::from("pw".to_string()),
        );
        assert!(!config.transport().tls.is_insecure());
    }

    #[test]
    fn entry_options_flow_into_session_timings() {
        let entry = ConfigEntry {
            entry_id: "lab".into(),
            data: EntryData {
                host: "https://10.0.0.2:8443".parse().unwrap(),
                username: "ops".into(),
                password: SecretString::from("pw".to_string()),
                site: "lab".into(),
                tls: TlsVerification::DangerAcceptInvalid,
                timeout: Duration::from_secs(7),
            },
            options: EntryOptions {
                reconnect_delay: Duration::from_secs(3),
                ..EntryOptions::default()
            },
        };

        let config = SessionConfig::from(&entry);
        assert_eq!(config.site, "lab");
        assert_eq!(config.timeout, Duration::from_secs(7));
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(1));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.transport().tls.is_insecure());
    }
}
