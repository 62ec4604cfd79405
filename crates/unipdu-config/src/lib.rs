//! Configuration for unipdu.
//!
//! TOML profiles, credential resolution (env + keyring + plaintext),
//! and translation to a `unipdu_core::ConfigEntry`. The CLI layers its
//! flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use unipdu_core::{ConfigEntry, DEFAULT_SITE, EntryData, EntryOptions, TlsVerification};

/// Keyring service name; entries are keyed `{profile}/password`.
pub const KEYRING_SERVICE: &str = "unipdu";

const ENV_PREFIX: &str = "UNIPDU_";
const PASSWORD_ENV: &str = "UNIPDU_PASSWORD";
const USERNAME_ENV: &str = "UNIPDU_USERNAME";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{name}' not found in {path}")]
    UnknownProfile { name: String, path: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named controller profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named controller profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Controller base URL (e.g., "https://192.168.1.1").
    pub controller: String,

    /// Site name.
    #[serde(default = "default_site")]
    pub site: String,

    pub username: Option<String>,

    /// Password (plaintext -- prefer keyring or `password_env`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Skip TLS verification. Off unless set.
    pub insecure: Option<bool>,

    /// HTTP timeout override, in seconds.
    pub timeout: Option<u64>,

    /// Outlet ids (`{mac}_{index}`) never exposed as switches.
    #[serde(default)]
    pub excluded_outlets: Vec<String>,

    /// Controller event keys that carry outlet state.
    #[serde(default)]
    pub event_keys: Vec<String>,

    /// Subset of `event_keys` meaning "on".
    #[serde(default)]
    pub event_is_on_keys: Vec<String>,

    /// Heartbeat sweep period, in seconds.
    pub heartbeat_interval: Option<u64>,

    /// Delay between reconnect attempts, in seconds.
    pub reconnect_delay: Option<u64>,
}

fn default_site() -> String {
    DEFAULT_SITE.into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "unipdu", "unipdu").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("unipdu");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config from `path` + environment.
///
/// Environment variables use the `UNIPDU_` prefix with `__` as the key
/// separator: `UNIPDU_DEFAULTS__TIMEOUT=10`, `UNIPDU_DEFAULT_PROFILE=lab`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

/// The config as TOML with plaintext passwords masked.
pub fn render_redacted(cfg: &Config) -> Result<String, ConfigError> {
    let mut redacted = cfg.clone();
    for profile in redacted.profiles.values_mut() {
        if profile.password.is_some() {
            profile.password = Some("********".into());
        }
    }
    Ok(toml::to_string_pretty(&redacted)?)
}

// ── Profile selection ───────────────────────────────────────────────

/// Pick the profile named `requested`, else the config's default.
pub fn select_profile<'a>(
    cfg: &'a Config,
    requested: Option<&str>,
) -> Result<(String, &'a Profile), ConfigError> {
    let name = requested
        .map(str::to_owned)
        .or_else(|| cfg.default_profile.clone())
        .unwrap_or_else(|| "default".into());

    cfg.profiles
        .get(&name)
        .map(|profile| (name.clone(), profile))
        .ok_or_else(|| ConfigError::UnknownProfile {
            path: config_path().display().to_string(),
            name,
        })
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve username + password for a profile.
///
/// Username: profile, then `UNIPDU_USERNAME`. Password: the profile's
/// `password_env` variable, then `UNIPDU_PASSWORD`, then the system
/// keyring, then plaintext in the profile.
pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<(String, SecretString), ConfigError> {
    let no_credentials = || ConfigError::NoCredentials {
        profile: profile_name.into(),
    };

    let username = profile
        .username
        .clone()
        .or_else(|| std::env::var(USERNAME_ENV).ok())
        .ok_or_else(no_credentials)?;

    // 1. Profile's password_env
    if let Some(ref env_name) = profile.password_env {
        if let Ok(pw) = std::env::var(env_name) {
            return Ok((username, SecretString::from(pw)));
        }
    }

    // 2. Global env var
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        return Ok((username, SecretString::from(pw)));
    }

    // 3. Keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password")) {
        if let Ok(pw) = entry.get_password() {
            return Ok((username, SecretString::from(pw)));
        }
    }

    // 4. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok((username, SecretString::from(pw.clone())));
    }

    Err(no_credentials())
}

/// TLS mode for a profile. Verification stays on unless `insecure` is set.
pub fn tls_for(profile: &Profile, force_insecure: bool) -> TlsVerification {
    if force_insecure || profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    }
}

/// Entry options from a profile, stock timings where unset.
pub fn entry_options(profile: &Profile) -> EntryOptions {
    let stock = EntryOptions::default();
    EntryOptions {
        excluded_outlets: profile.excluded_outlets.clone(),
        event_keys: profile.event_keys.clone(),
        event_is_on_keys: profile.event_is_on_keys.clone(),
        heartbeat_interval: profile
            .heartbeat_interval
            .map_or(stock.heartbeat_interval, Duration::from_secs),
        reconnect_delay: profile
            .reconnect_delay
            .map_or(stock.reconnect_delay, Duration::from_secs),
    }
}

/// Build a `ConfigEntry` from a profile with no flag overrides.
pub fn profile_to_entry(profile: &Profile, profile_name: &str) -> Result<ConfigEntry, ConfigError> {
    let host: url::Url = profile
        .controller
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "controller".into(),
            reason: format!("invalid URL: {}", profile.controller),
        })?;

    let (username, password) = resolve_credentials(profile, profile_name)?;

    Ok(ConfigEntry {
        entry_id: profile_name.into(),
        data: EntryData {
            host,
            username,
            password,
            site: profile.site.clone(),
            tls: tls_for(profile, false),
            timeout: Duration::from_secs(profile.timeout.unwrap_or_else(default_timeout)),
        },
        options: entry_options(profile),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    const SAMPLE: &str = r#"
default_profile = "rack"

[defaults]
timeout = 12

[profiles.rack]
controller = "https://10.0.0.1"
username = "ops"
password = "hunter2"
excluded_outlets = ["aa:bb:cc:dd:ee:ff_3"]
event_keys = ["EVT_USP_OutletOn", "EVT_USP_OutletOff"]
event_is_on_keys = ["EVT_USP_OutletOn"]
reconnect_delay = 5

[profiles.lab]
controller = "https://lab.local:8443"
site = "lab"
username = "ops"
password_env = "UNIPDU_TEST_LAB_PW"
ca_cert = "/etc/ssl/lab-ca.pem"
"#;

    /// Load `SAMPLE` inside a jail so environment overrides from other
    /// tests can't leak in.
    fn with_sample(check: impl FnOnce(Config)) {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            check(load_config_from(Path::new("config.toml")).unwrap());
            Ok(())
        });
    }

    #[test]
    fn loads_profiles_from_toml() {
        with_sample(|cfg| {
            assert_eq!(cfg.default_profile.as_deref(), Some("rack"));
            assert_eq!(cfg.defaults.timeout, 12);
            assert_eq!(cfg.defaults.color, "auto");
            assert_eq!(cfg.profiles.len(), 2);
            assert_eq!(cfg.profiles["rack"].site, "default");
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        figment::Jail::expect_with(|_| {
            let cfg = load_config_from(Path::new("absent.toml")).unwrap();
            assert!(cfg.profiles.is_empty());
            assert_eq!(cfg.default_profile.as_deref(), Some("default"));
            Ok(())
        });
    }

    #[test]
    fn select_profile_falls_back_to_default() {
        with_sample(|cfg| {
            let (name, _) = select_profile(&cfg, None).unwrap();
            assert_eq!(name, "rack");
            let (name, profile) = select_profile(&cfg, Some("lab")).unwrap();
            assert_eq!(name, "lab");
            assert_eq!(profile.site, "lab");
            assert!(matches!(
                select_profile(&cfg, Some("nope")),
                Err(ConfigError::UnknownProfile { .. })
            ));
        });
    }

    #[test]
    fn profile_becomes_config_entry() {
        with_sample(|cfg| {
            let entry = profile_to_entry(&cfg.profiles["rack"], "rack").unwrap();

            assert_eq!(entry.entry_id, "rack");
            assert_eq!(entry.data.host.as_str(), "https://10.0.0.1/");
            assert_eq!(entry.data.username, "ops");
            assert_eq!(entry.data.tls, TlsVerification::SystemDefaults);
            assert_eq!(entry.options.excluded_outlets, vec!["aa:bb:cc:dd:ee:ff_3"]);
            assert_eq!(entry.options.event_is_on_keys, vec!["EVT_USP_OutletOn"]);
            assert_eq!(entry.options.reconnect_delay, Duration::from_secs(5));
            assert_eq!(entry.options.heartbeat_interval, Duration::from_secs(1));
        });
    }

    #[test]
    fn tls_follows_profile_and_override() {
        with_sample(|cfg| {
            let lab = &cfg.profiles["lab"];
            assert_eq!(
                tls_for(lab, false),
                TlsVerification::CustomCa(PathBuf::from("/etc/ssl/lab-ca.pem"))
            );
            assert_eq!(tls_for(lab, true), TlsVerification::DangerAcceptInvalid);
        });
    }

    #[test]
    fn password_env_wins_over_plaintext() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("UNIPDU_TEST_PW", "from-env");
            let profile = Profile {
                controller: "https://10.0.0.1".into(),
                username: Some("ops".into()),
                password: Some("plaintext".into()),
                password_env: Some("UNIPDU_TEST_PW".into()),
                ..Profile::default()
            };

            let (_, password) = resolve_credentials(&profile, "jail").unwrap();
            assert_eq!(password.expose_secret(), "from-env");
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file_values() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.toml", SAMPLE)?;
            jail.set_env("UNIPDU_DEFAULT_PROFILE", "lab");
            jail.set_env("UNIPDU_DEFAULTS__TIMEOUT", "45");

            let cfg = load_config_from(Path::new("config.toml")).unwrap();
            assert_eq!(cfg.default_profile.as_deref(), Some("lab"));
            assert_eq!(cfg.defaults.timeout, 45);
            Ok(())
        });
    }

    #[test]
    fn missing_username_is_reported() {
        let profile = Profile {
            controller: "https://10.0.0.1".into(),
            ..Profile::default()
        };
        if std::env::var(USERNAME_ENV).is_err() {
            assert!(matches!(
                resolve_credentials(&profile, "empty"),
                Err(ConfigError::NoCredentials { .. })
            ));
        }
    }

    #[test]
    fn invalid_controller_url_is_a_validation_error() {
        let profile = Profile {
            controller: "not a url".into(),
            username: Some("ops".into()),
            password: Some("pw".into()),
            ..Profile::default()
        };
        assert!(matches!(
            profile_to_entry(&profile, "bad"),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn redacted_render_masks_passwords() {
        with_sample(|cfg| {
            let rendered = render_redacted(&cfg).unwrap();
            assert!(!rendered.contains("hunter2"));
            assert!(rendered.contains("********"));
        });
    }
}
