//! Config subcommand handlers.

use std::collections::HashMap;
use std::path::PathBuf;

use dialoguer::{Input, Password, Select};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, Defaults, Profile};
use crate::error::CliError;
use crate::output;

const MASK: &str = "****";

// ── Helpers ─────────────────────────────────────────────────────────

/// Format config for display. Secrets are masked before this is called.
fn format_config(cfg: &Config) -> String {
    use std::fmt::Write;
    let mut out = String::new();

    if let Some(ref default) = cfg.default_profile {
        let _ = writeln!(out, "default_profile = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "color = \"{}\"", cfg.defaults.color);
    let _ = writeln!(out, "insecure = {}", cfg.defaults.insecure);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);

    let mut names: Vec<_> = cfg.profiles.keys().collect();
    names.sort();
    for name in names {
        let p = &cfg.profiles[name];
        let _ = writeln!(out);
        let _ = writeln!(out, "[profiles.{name}]");
        let _ = writeln!(out, "placement_url = \"{}\"", p.placement_url);
        if let Some(ref mv) = p.microversion {
            let _ = writeln!(out, "microversion = \"{mv}\"");
        }
        if let Some(ref token) = p.auth_token {
            let _ = writeln!(out, "auth_token = \"{token}\"");
        }
        if let Some(ref env) = p.auth_token_env {
            let _ = writeln!(out, "auth_token_env = \"{env}\"");
        }
        if let Some(ref ca) = p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if let Some(retries) = p.generation_conflict_retries {
            let _ = writeln!(out, "generation_conflict_retries = {retries}");
        }
        if let Some(ref state) = p.state_file {
            let _ = writeln!(out, "state_file = \"{}\"", state.display());
        }
    }

    out
}

fn mask_secrets(cfg: &mut Config) {
    for profile in cfg.profiles.values_mut() {
        if profile.auth_token.is_some() {
            profile.auth_token = Some(MASK.into());
        }
    }
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// Store the token in the system keyring, or hand it back for plaintext
/// config when the user prefers that.
fn prompt_token_storage(token: String, profile_name: &str) -> Result<Option<String>, CliError> {
    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Where to store the auth token?")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection != 0 {
        return Ok(Some(token));
    }
    let entry = keyring::Entry::new("cyborg", &format!("{profile_name}/auth-token")).map_err(|e| {
        CliError::Validation {
            field: "keyring".into(),
            reason: format!("failed to access keyring: {e}"),
        }
    })?;
    entry.set_password(&token).map_err(|e| CliError::Validation {
        field: "keyring".into(),
        reason: format!("failed to store auth token in keyring: {e}"),
    })?;
    eprintln!("   ✓ auth token stored in system keyring");
    Ok(None)
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            let config_path = config::config_path();
            eprintln!("cyborg: configuration wizard");
            eprintln!("   Config path: {}\n", config_path.display());

            let profile_name: String = Input::new()
                .with_prompt("Profile name")
                .default("default".into())
                .interact_text()
                .map_err(prompt_err)?;

            let placement_url: String = Input::new()
                .with_prompt("Placement endpoint")
                .default("http://controller/placement".into())
                .interact_text()
                .map_err(prompt_err)?;
            placement_url
                .parse::<url::Url>()
                .map_err(|e| CliError::Validation {
                    field: "placement_url".into(),
                    reason: format!("invalid URL: {e}"),
                })?;

            let token = Password::new()
                .with_prompt("Auth token (leave empty for none)")
                .allow_empty_password(true)
                .interact()
                .map_err(prompt_err)?;
            let auth_token = if token.is_empty() {
                None
            } else {
                prompt_token_storage(token, &profile_name)?
            };

            let state_file: String = Input::new()
                .with_prompt("State file")
                .default(config::default_state_file().display().to_string())
                .interact_text()
                .map_err(prompt_err)?;

            let profile = Profile {
                placement_url,
                auth_token,
                state_file: Some(PathBuf::from(state_file)),
                ..Profile::default()
            };

            let mut cfg = config::load_config_or_default();
            if cfg.profiles.is_empty() {
                cfg = Config {
                    default_profile: Some(profile_name.clone()),
                    defaults: Defaults::default(),
                    profiles: HashMap::new(),
                };
            }
            cfg.profiles.insert(profile_name.clone(), profile);
            config::save_config(&cfg)?;

            eprintln!("\n✓ Configuration written to {}", config_path.display());
            eprintln!("  Profile: {profile_name}");
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let mut cfg = config::load_config_or_default();
            mask_secrets(&mut cfg);
            let out = output::render_single(&global.output, &cfg, format_config, |_| {
                "config".into()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }
    }
}
