//! CLI configuration -- flag overrides on top of `unipdu_config` profiles.

use std::time::Duration;

use secrecy::SecretString;

use unipdu_config::{Config, Profile};
use unipdu_core::{ConfigEntry, DEFAULT_SITE, EntryData, EntryOptions, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use unipdu_config::{config_path, load_config_or_default, render_redacted};

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// Build the `ConfigEntry` for this invocation.
///
/// Flags override the profile. Without a matching profile, `--controller`
/// plus a username and `UNIPDU_PASSWORD` are enough.
pub fn resolve_entry(global: &GlobalOpts, config: &Config) -> Result<ConfigEntry, CliError> {
    let profile_name = active_profile_name(global, config);

    let Some(stored) = config.profiles.get(&profile_name) else {
        if global.profile.is_some() {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                path: config_path().display().to_string(),
            });
        }
        let controller = global.controller.clone().ok_or_else(|| CliError::NoConfig {
            path: config_path().display().to_string(),
        })?;
        let adhoc = Profile {
            controller,
            site: DEFAULT_SITE.into(),
            ..Profile::default()
        };
        return entry_from(&adhoc, &profile_name, global, config);
    };

    entry_from(stored, &profile_name, global, config)
}

fn entry_from(
    profile: &Profile,
    profile_name: &str,
    global: &GlobalOpts,
    config: &Config,
) -> Result<ConfigEntry, CliError> {
    // 1. Controller URL (flag > profile)
    let url_str = global.controller.as_deref().unwrap_or(&profile.controller);
    let host: url::Url = url_str.parse().map_err(|_| CliError::Validation {
        field: "controller".into(),
        reason: format!("invalid URL: {url_str}"),
    })?;

    // 2. Credentials (username flag > profile chain)
    let mut profile = profile.clone();
    if let Some(ref username) = global.username {
        profile.username = Some(username.clone());
    }
    let (username, password): (String, SecretString) =
        unipdu_config::resolve_credentials(&profile, profile_name)?;

    // 3. TLS verification
    let tls: TlsVerification =
        unipdu_config::tls_for(&profile, global.insecure || config.defaults.insecure);

    // 4. Site and timeout
    let site = global.site.clone().unwrap_or_else(|| profile.site.clone());
    let timeout = global
        .timeout
        .or(profile.timeout)
        .unwrap_or(config.defaults.timeout);

    let options: EntryOptions = unipdu_config::entry_options(&profile);

    Ok(ConfigEntry {
        entry_id: profile_name.into(),
        data: EntryData {
            host,
            username,
            password,
            site,
            tls,
            timeout: Duration::from_secs(timeout),
        },
        options,
    })
}
