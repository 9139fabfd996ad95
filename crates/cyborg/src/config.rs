//! CLI configuration: a thin wrapper around `cyborg_config` shared types.
//!
//! Re-exports the shared types and adds CLI-specific resolution that
//! respects `GlobalOpts` flag overrides (--placement-url, --token, etc.).

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use cyborg_core::{ConductorConfig, TlsVerification};

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use cyborg_config::{
    Config, Defaults, Profile, config_path, default_state_file, load_config_or_default,
    save_config,
};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

/// State file: flag > env > profile > platform default.
pub fn resolve_state_file(global: &GlobalOpts) -> PathBuf {
    if let Some(ref path) = global.state {
        return path.clone();
    }
    let cfg = load_config_or_default();
    let name = active_profile_name(global, &cfg);
    cfg.profiles
        .get(&name)
        .map_or_else(default_state_file, Profile::state_file_or_default)
}

/// Build a `ConductorConfig` from the config file, profile, and CLI
/// overrides. Flags take priority over profile values.
pub fn resolve_conductor_config(global: &GlobalOpts) -> Result<ConductorConfig, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let mut config = match cfg.profiles.get(&profile_name) {
        Some(profile) => cyborg_config::profile_to_conductor_config(profile, &profile_name)?,
        None => {
            // No profile: the endpoint must come from flags / env alone.
            let url_str = global.placement_url.as_deref().ok_or_else(|| CliError::NoConfig {
                path: config_path().display().to_string(),
            })?;
            ConductorConfig::new(parse_url(url_str)?)
        }
    };

    if let Some(ref url_str) = global.placement_url {
        config.placement_url = parse_url(url_str)?;
    }
    if let Some(ref token) = global.token {
        config.auth_token = Some(SecretString::from(token.clone()));
    }
    if global.insecure {
        config.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(secs) = global.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(ref microversion) = global.microversion {
        config.microversion.clone_from(microversion);
    }
    Ok(config)
}

fn parse_url(raw: &str) -> Result<url::Url, CliError> {
    raw.parse().map_err(|_| CliError::Validation {
        field: "placement_url".into(),
        reason: format!("invalid URL: {raw}"),
    })
}
