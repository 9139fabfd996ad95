//! Device command handlers. Read-only views of the state file.

use std::collections::BTreeSet;

use tabled::Tabled;

use cyborg_core::{StoredDevice, load_host_tree};

use crate::cli::{DevicesArgs, DevicesCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Host")]
    host: String,
    #[tabled(rename = "Type")]
    dtype: String,
    #[tabled(rename = "Vendor")]
    vendor: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Locator")]
    locator: String,
    #[tabled(rename = "Deployables")]
    deployables: usize,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl From<&StoredDevice> for DeviceRow {
    fn from(d: &StoredDevice) -> Self {
        let touched = d.device.updated_at.unwrap_or(d.device.created_at);
        Self {
            id: d.device.id,
            host: d.device.hostname.clone(),
            dtype: d.device.fields.device_type.to_string(),
            vendor: d.device.fields.vendor.clone(),
            model: d.device.fields.model.clone(),
            locator: d.controlpath_id.cpid_info.clone(),
            deployables: d.deployables.len(),
            updated: touched.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: DevicesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        DevicesCommand::List { host } => {
            let (store, _) = util::open_store(global)?;
            let hosts: BTreeSet<String> = match host {
                Some(host) => BTreeSet::from([host]),
                None => store.all_devices().into_iter().map(|d| d.hostname).collect(),
            };

            let mut devices = Vec::new();
            for host in &hosts {
                devices.extend(load_host_tree(&store, host).await?);
            }

            let out = output::render_list(
                &global.output,
                &devices,
                |d| DeviceRow::from(d),
                |d| d.device.uuid.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
