// ── Placement propagation ──
//
// Converges the host's provider subtree on the discovered device tree: one
// provider per device under the host's compute root, one per deployable
// under its device, each deployable carrying a single-class inventory and
// its traits. The subtree is refreshed from Placement every pass and edited
// under the root lock, so a pass repairs whatever an earlier failed pass
// left behind. Unchanged providers cost reads only.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use cyborg_placement::InventoryRecord;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use super::naming::{
    deployable_provider_name, device_provider_name, is_device_provider_name, provider_uuid,
};
use super::report::{FlushCounts, ReportClient};
use super::tree::{Inventory, ProviderTree};
use crate::error::CoreError;
use crate::model::DriverDevice;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PropagationOutcome {
    pub providers_created: usize,
    /// Providers whose inventory or traits were rewritten.
    pub providers_updated: usize,
    pub providers_removed: usize,
}

impl From<FlushCounts> for PropagationOutcome {
    fn from(counts: FlushCounts) -> Self {
        Self {
            providers_created: counts.created,
            providers_updated: counts.updated,
            providers_removed: counts.removed,
        }
    }
}

impl PropagationOutcome {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// The inventory record reported for a deployable: `total` single units,
/// none reserved, no overcommit.
pub fn accelerator_inventory(resource_class: &str, total: u32) -> Inventory {
    Inventory::from([(
        resource_class.to_owned(),
        InventoryRecord {
            total,
            reserved: 0,
            min_unit: 1,
            max_unit: 1,
            step_size: 1,
            allocation_ratio: 1.0,
        },
    )])
}

// ── Desired providers ────────────────────────────────────────────────

struct DesiredLeaf {
    name: String,
    uuid: Uuid,
    resource_class: String,
    inventory: Inventory,
    traits: BTreeSet<String>,
}

struct DesiredDevice {
    name: String,
    uuid: Uuid,
    deployables: Vec<DesiredLeaf>,
}

fn desired_devices(devices: &[DriverDevice]) -> Result<Vec<DesiredDevice>, CoreError> {
    devices
        .iter()
        .map(|device| -> Result<DesiredDevice, CoreError> {
            let device_type = device.fields.device_type;
            let name = device_provider_name(device_type, &device.controlpath_id.cpid_info);
            let deployables = device
                .deployables
                .iter()
                .map(|deployable| -> Result<DesiredLeaf, CoreError> {
                    let resource_class = deployable
                        .resource_class()
                        .or_else(|| device_type.resource_class())
                        .ok_or_else(|| CoreError::ResourceClassNotFound {
                            device_type: device_type.to_string(),
                        })?;
                    let name = deployable_provider_name(&deployable.name);
                    Ok(DesiredLeaf {
                        uuid: provider_uuid(&name),
                        name,
                        resource_class: resource_class.to_owned(),
                        inventory: accelerator_inventory(
                            resource_class,
                            deployable.num_accelerators,
                        ),
                        traits: deployable.traits().into_iter().collect(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DesiredDevice {
                uuid: provider_uuid(&name),
                name,
                deployables,
            })
        })
        .collect()
}

/// Put `uuid` under `parent` in `tree`, moving it if it sits elsewhere.
fn place(tree: &mut ProviderTree, name: &str, uuid: Uuid, parent: &Uuid) -> Result<(), CoreError> {
    match tree.get(&uuid).map(|p| p.parent_uuid) {
        Some(current) if current == Some(*parent) => return Ok(()),
        Some(_) => {
            tree.remove(&uuid);
        }
        None => {}
    }
    tree.new_child(name, uuid, parent, 0)
}

/// Drop every child of `parent` that `keep` rejects, with its subtree.
fn prune_children(tree: &mut ProviderTree, parent: &Uuid, keep: impl Fn(&str, &Uuid) -> bool) {
    let stale: Vec<Uuid> = tree
        .children(parent)
        .filter(|p| !keep(&p.name, &p.uuid))
        .map(|p| p.uuid)
        .collect();
    for uuid in &stale {
        tree.remove(uuid);
    }
}

/// Edit a fresh copy of the compute root's tree into the desired shape.
/// Only device providers (and everything under them) are touched; other
/// children of the compute root belong to someone else.
fn shape_host_tree(
    tree: &mut ProviderTree,
    root: &Uuid,
    desired: &[DesiredDevice],
) -> Result<(), CoreError> {
    let wanted: HashSet<Uuid> = desired.iter().map(|d| d.uuid).collect();
    prune_children(tree, root, |name, uuid| {
        !is_device_provider_name(name) || wanted.contains(uuid)
    });

    for device in desired {
        place(tree, &device.name, device.uuid, root)?;
        let leaves: HashSet<Uuid> = device.deployables.iter().map(|d| d.uuid).collect();
        prune_children(tree, &device.uuid, |_, uuid| leaves.contains(uuid));

        for leaf in &device.deployables {
            place(tree, &leaf.name, leaf.uuid, &device.uuid)?;
            tree.update_inventory(&leaf.uuid, leaf.inventory.clone(), None)?;
            tree.update_traits(&leaf.uuid, leaf.traits.clone(), None)?;
        }
    }
    Ok(())
}

// ── Reporter ─────────────────────────────────────────────────────────

pub struct PlacementReporter {
    client: Arc<ReportClient>,
}

impl PlacementReporter {
    pub fn new(client: Arc<ReportClient>) -> Self {
        Self { client }
    }

    /// The compute node provider, looked up by host name.
    pub async fn root_provider(&self, host: &str) -> Result<Option<Uuid>, CoreError> {
        Ok(self
            .client
            .find_provider_by_name(host)
            .await?
            .map(|rp| rp.uuid))
    }

    /// Make the device providers under `host`'s compute root match
    /// `devices`: create what is missing, rewrite changed inventory and
    /// traits, and delete device and deployable providers no longer
    /// discovered.
    ///
    /// A host without a compute root fails with `RootProviderNotFound`
    /// unless there is nothing to report.
    pub async fn sync_host(
        &self,
        host: &str,
        devices: &[DriverDevice],
    ) -> Result<PropagationOutcome, CoreError> {
        let desired = desired_devices(devices)?;
        let Some(root) = self.root_provider(host).await? else {
            if desired.is_empty() {
                debug!(host, "no compute root and no devices, nothing to propagate");
                return Ok(PropagationOutcome::default());
            }
            return Err(CoreError::RootProviderNotFound {
                host: host.to_owned(),
            });
        };

        let classes: BTreeSet<&str> = desired
            .iter()
            .flat_map(|d| d.deployables.iter().map(|l| l.resource_class.as_str()))
            .collect();
        self.client
            .ensure_resource_classes(&classes.into_iter().collect::<Vec<_>>())
            .await?;

        let counts = self
            .client
            .update_provider_tree(&root, host, None, |tree| {
                shape_host_tree(tree, &root, &desired)
            })
            .await?;
        let outcome = PropagationOutcome::from(counts);
        if !outcome.is_noop() {
            info!(
                host,
                created = outcome.providers_created,
                updated = outcome.providers_updated,
                removed = outcome.providers_removed,
                "placement converged"
            );
        }
        Ok(outcome)
    }

    /// Report one leaf provider: ensure its resource class, ensure the
    /// provider under `parent`, and set its inventory and traits.
    pub async fn provider_report(
        &self,
        name: &str,
        resource_class: &str,
        traits: &[String],
        total: u32,
        parent: &Uuid,
    ) -> Result<Uuid, CoreError> {
        self.client.ensure_resource_classes(&[resource_class]).await?;

        let uuid = provider_uuid(name);
        let inventory = accelerator_inventory(resource_class, total);
        let traits: BTreeSet<String> = traits.iter().cloned().collect();
        self.client
            .update_provider_tree(&uuid, name, Some(parent), |tree| {
                tree.update_inventory(&uuid, inventory, None)?;
                tree.update_traits(&uuid, traits, None)
            })
            .await?;
        Ok(uuid)
    }
}
