//! Resource provider command handlers.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;
use uuid::Uuid;

use cyborg_core::{
    Conductor, MemoryStore, ResourceProvider, deployable_provider_name, device_provider_name,
    provider_uuid,
};

use crate::cli::{GlobalOpts, ProvidersArgs, ProvidersCommand};
use crate::config;
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct ProviderRow {
    #[tabled(rename = "UUID")]
    uuid: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Generation")]
    generation: u64,
    #[tabled(rename = "Parent")]
    parent: String,
}

impl From<&ResourceProvider> for ProviderRow {
    fn from(rp: &ResourceProvider) -> Self {
        Self {
            uuid: rp.uuid.to_string(),
            name: rp.name.clone(),
            generation: rp.generation,
            parent: rp
                .parent_provider_uuid
                .map_or_else(|| "-".into(), |p| p.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ProviderIdentity {
    name: String,
    uuid: Uuid,
}

fn identity_detail(id: &ProviderIdentity) -> String {
    format!("Name: {}\nUUID: {}", id.name, id.uuid)
}

/// Conductor for provider-only operations; its store is never consulted.
fn connect(global: &GlobalOpts) -> Result<Conductor, CliError> {
    let conductor_config = config::resolve_conductor_config(global)?;
    Ok(Conductor::new(conductor_config, Arc::new(MemoryStore::new()))?)
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: ProvidersArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ProvidersCommand::Uuid {
            name,
            device_type,
            cpid,
        } => {
            let name = match (name, device_type, cpid) {
                (Some(name), _, _) => deployable_provider_name(&name),
                (None, Some(device_type), Some(cpid)) => device_provider_name(device_type, &cpid),
                _ => {
                    return Err(CliError::Validation {
                        field: "provider".into(),
                        reason: "give a provider name, or --device-type with --cpid".into(),
                    });
                }
            };
            let identity = ProviderIdentity {
                uuid: provider_uuid(&name),
                name,
            };
            let out = output::render_single(&global.output, &identity, identity_detail, |i| {
                i.uuid.to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ProvidersCommand::Report {
            name,
            resource_class,
            total,
            parent,
            traits,
        } => {
            let conductor = connect(global)?;
            let uuid = conductor
                .provider_report(&name, &resource_class, &traits, total, &parent)
                .await?;
            let identity = ProviderIdentity { name, uuid };
            let out = output::render_single(&global.output, &identity, identity_detail, |i| {
                i.uuid.to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ProvidersCommand::List { host } => {
            let conductor = connect(global)?;
            let client = conductor.report_client();
            let Some(root) = client.find_provider_by_name(&host).await? else {
                return Err(CliError::NotFound {
                    resource_type: "compute node provider".into(),
                    identifier: host,
                    hint: "The compute service must register the host with Placement first.".into(),
                });
            };
            let providers = client.providers_in_tree(&root.uuid).await?;
            let out = output::render_list(&global.output, &providers, |rp| ProviderRow::from(rp), |rp| {
                rp.uuid.to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ProvidersCommand::Delete { uuid, recursive } => {
            let what = if recursive {
                format!("Delete provider {uuid} and all of its descendants?")
            } else {
                format!("Delete provider {uuid}?")
            };
            if !util::confirm(&what, "providers delete", global.yes)? {
                return Ok(());
            }

            let conductor = connect(global)?;
            let client = conductor.report_client();
            if recursive {
                let removed = client.delete_provider_subtree(&uuid).await?;
                if !global.quiet {
                    eprintln!("Removed {removed} provider(s)");
                }
            } else {
                client.delete_provider(&uuid).await?;
                if !global.quiet {
                    eprintln!("Provider {uuid} deleted");
                }
            }
            Ok(())
        }
    }
}
