//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use cyborg_core::{DiscoveryDriver, DriverDevice, JsonFileDiscovery, MemoryStore};

use crate::cli::GlobalOpts;
use crate::config;
use crate::error::CliError;

/// Ask before a destructive action. `--yes` skips the prompt; without a
/// terminal the action is refused.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// Read a device tree file through the JSON discovery driver.
pub fn read_tree(path: &Path) -> Result<Vec<DriverDevice>, CliError> {
    Ok(JsonFileDiscovery::new(path).discover()?)
}

/// Open the state file selected by flags / profile. A missing file is an
/// empty inventory.
pub fn open_store(global: &GlobalOpts) -> Result<(MemoryStore, PathBuf), CliError> {
    let path = config::resolve_state_file(global);
    tracing::debug!(path = %path.display(), "opening state file");
    let store = MemoryStore::load(&path)?;
    Ok((store, path))
}
