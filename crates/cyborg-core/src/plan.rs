// ── Reconciliation planning ──
//
// `(persisted tree, discovered tree) -> ReconcilePlan`, with no I/O.
//
// Store operations are ordered the way they must be applied: surviving
// devices first (updates and nested diffs), then deleted devices expanded
// bottom-up, then added devices created top-down with their subtree.
// Placement operations preview what the diff implies for Placement: devices
// whose subtree changed are re-reported, providers whose device or
// deployable disappeared are removed. A pass does not execute them; it
// converges Placement on the discovered tree against fresh remote state.

use serde::Serialize;
use strum::Display;
use uuid::Uuid;

use crate::diff::{
    DiffError, LayerDiff, diff_attach_handles, diff_attributes, diff_deployables, diff_devices,
};
use crate::model::{
    DeviceFields, DriverAttachHandle, DriverAttribute, DriverDeployable, DriverDevice,
    OrphanedDevice, StoredDeployable, StoredDevice, canonical_locator,
};
use crate::placement::naming::{deployable_provider_name, device_provider_name, provider_uuid};

// ── Operations ───────────────────────────────────────────────────────

/// One write against the inventory store. Ids are store keys resolved
/// from identity matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StoreOp {
    /// Create a device with its controlpath id and full subtree.
    CreateDevice { device: DriverDevice },
    UpdateDevice { device_id: i64, fields: DeviceFields },
    DestroyDevice { device_id: i64 },
    DestroyControlpathId { cpid_id: i64 },

    /// Create a deployable with its attributes and attach handles.
    CreateDeployable {
        device_id: i64,
        cpid_id: i64,
        deployable: DriverDeployable,
    },
    UpdateDeployable { deployable_id: i64, num_accelerators: u32 },
    DestroyDeployable { deployable_id: i64 },

    CreateAttribute {
        deployable_id: i64,
        attribute: DriverAttribute,
    },
    UpdateAttribute { attribute_id: i64, value: String },
    DestroyAttribute { attribute_id: i64 },

    CreateAttachHandle {
        deployable_id: i64,
        cpid_id: i64,
        handle: DriverAttachHandle,
    },
    UpdateAttachHandle {
        handle_id: i64,
        attach_type: String,
        in_use: bool,
    },
    DestroyAttachHandle { handle_id: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum OpKind {
    Create,
    Update,
    Destroy,
}

impl StoreOp {
    pub fn kind(&self) -> OpKind {
        match self {
            Self::CreateDevice { .. }
            | Self::CreateDeployable { .. }
            | Self::CreateAttribute { .. }
            | Self::CreateAttachHandle { .. } => OpKind::Create,
            Self::UpdateDevice { .. }
            | Self::UpdateDeployable { .. }
            | Self::UpdateAttribute { .. }
            | Self::UpdateAttachHandle { .. } => OpKind::Update,
            Self::DestroyDevice { .. }
            | Self::DestroyControlpathId { .. }
            | Self::DestroyDeployable { .. }
            | Self::DestroyAttribute { .. }
            | Self::DestroyAttachHandle { .. } => OpKind::Destroy,
        }
    }

    /// Short human-readable description of the row this op touches.
    pub fn target(&self) -> String {
        match self {
            Self::CreateDevice { device } => format!(
                "device {} {}",
                device.fields.device_type,
                canonical_locator(&device.controlpath_id.cpid_info)
            ),
            Self::UpdateDevice { device_id, .. } | Self::DestroyDevice { device_id } => {
                format!("device #{device_id}")
            }
            Self::DestroyControlpathId { cpid_id } => format!("controlpath id #{cpid_id}"),
            Self::CreateDeployable { deployable, .. } => format!("deployable {}", deployable.name),
            Self::UpdateDeployable { deployable_id, .. } | Self::DestroyDeployable { deployable_id } => {
                format!("deployable #{deployable_id}")
            }
            Self::CreateAttribute { attribute, .. } => format!("attribute {}", attribute.key),
            Self::UpdateAttribute { attribute_id, .. } | Self::DestroyAttribute { attribute_id } => {
                format!("attribute #{attribute_id}")
            }
            Self::CreateAttachHandle { handle, .. } => {
                format!("attach handle {}", canonical_locator(&handle.attach_info))
            }
            Self::UpdateAttachHandle { handle_id, .. } | Self::DestroyAttachHandle { handle_id } => {
                format!("attach handle #{handle_id}")
            }
        }
    }
}

/// One change to propagate to Placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlacementOp {
    /// Ensure the device provider and report every deployable under it.
    ReportDevice { device: DriverDevice },
    /// Delete a provider and everything beneath it.
    RemoveProvider { name: String, uuid: Uuid },
}

impl PlacementOp {
    fn remove(name: String) -> Self {
        let uuid = provider_uuid(&name);
        Self::RemoveProvider { name, uuid }
    }
}

// ── Statistics ───────────────────────────────────────────────────────

/// Classification counts for one layer, summed over every diff run at
/// that layer. Subtrees of wholly added or deleted devices are counted at
/// the device layer only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LayerCounts {
    pub same: usize,
    pub dirty: usize,
    pub added: usize,
    pub deleted: usize,
}

impl LayerCounts {
    fn record<O, N>(&mut self, diff: &LayerDiff<'_, O, N>) {
        self.same += diff.same.len();
        self.dirty += diff.dirty_count();
        self.added += diff.added.len();
        self.deleted += diff.deleted.len();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    pub devices: LayerCounts,
    pub deployables: LayerCounts,
    pub attributes: LayerCounts,
    pub attach_handles: LayerCounts,
}

// ── Plan ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcilePlan {
    pub host: String,
    pub store_ops: Vec<StoreOp>,
    /// Preview only, for operators reading a plan.
    pub placement_ops: Vec<PlacementOp>,
    pub stats: DiffStats,
}

impl ReconcilePlan {
    /// Diff `old` against `new` for `host` and order the resulting writes.
    ///
    /// Fails without producing a plan if any layer is malformed.
    pub fn build(host: &str, old: &[StoredDevice], new: &[DriverDevice]) -> Result<Self, DiffError> {
        let mut plan = Self {
            host: host.to_owned(),
            ..Self::default()
        };

        let devices = diff_devices(old, new)?;
        plan.stats.devices.record(&devices);

        for m in &devices.same {
            plan.plan_surviving_device(m.old, m.new, m.dirty)?;
        }
        for (_, gone) in &devices.deleted {
            plan.plan_destroy_device(gone);
        }
        for (_, fresh) in &devices.added {
            plan.store_ops.push(StoreOp::CreateDevice {
                device: (*fresh).clone(),
            });
            plan.placement_ops.push(PlacementOp::ReportDevice {
                device: (*fresh).clone(),
            });
        }

        Ok(plan)
    }

    /// Destroy `orphans` before anything else in the plan. They are
    /// counted as deleted devices.
    pub fn discard_orphans(&mut self, orphans: &[OrphanedDevice]) {
        if orphans.is_empty() {
            return;
        }
        let planned = std::mem::take(&mut self.store_ops);
        for orphan in orphans {
            for deployable in &orphan.deployables {
                self.plan_destroy_deployable(deployable);
            }
            self.store_ops.push(StoreOp::DestroyDevice {
                device_id: orphan.device.id,
            });
        }
        self.store_ops.extend(planned);
        self.stats.devices.deleted += orphans.len();
    }

    pub fn is_empty(&self) -> bool {
        self.store_ops.is_empty() && self.placement_ops.is_empty()
    }

    pub fn count(&self, kind: OpKind) -> usize {
        self.store_ops.iter().filter(|op| op.kind() == kind).count()
    }

    fn plan_surviving_device(
        &mut self,
        old: &StoredDevice,
        new: &DriverDevice,
        dirty: bool,
    ) -> Result<(), DiffError> {
        let device_id = old.device.id;
        let cpid_id = old.controlpath_id.id;

        if dirty {
            self.store_ops.push(StoreOp::UpdateDevice {
                device_id,
                fields: new.fields.clone(),
            });
        }

        let deployables = diff_deployables(&old.deployables, &new.deployables)?;
        self.stats.deployables.record(&deployables);
        // Attach-handle changes never reach Placement; everything else does.
        let mut placement_changed = dirty || !deployables.is_clean();

        for m in &deployables.same {
            let deployable_id = m.old.deployable.id;
            if m.dirty {
                self.store_ops.push(StoreOp::UpdateDeployable {
                    deployable_id,
                    num_accelerators: m.new.num_accelerators,
                });
            }

            let attributes = diff_attributes(&m.old.attributes, &m.new.attributes)?;
            self.stats.attributes.record(&attributes);
            placement_changed |= !attributes.is_clean();
            for a in attributes.same.iter().filter(|a| a.dirty) {
                self.store_ops.push(StoreOp::UpdateAttribute {
                    attribute_id: a.old.id,
                    value: a.new.value.clone(),
                });
            }
            for (_, a) in &attributes.deleted {
                self.store_ops
                    .push(StoreOp::DestroyAttribute { attribute_id: a.id });
            }
            for (_, a) in &attributes.added {
                self.store_ops.push(StoreOp::CreateAttribute {
                    deployable_id,
                    attribute: (*a).clone(),
                });
            }

            let handles = diff_attach_handles(&m.old.attach_handles, &m.new.attach_handles)?;
            self.stats.attach_handles.record(&handles);
            for h in handles.same.iter().filter(|h| h.dirty) {
                self.store_ops.push(StoreOp::UpdateAttachHandle {
                    handle_id: h.old.id,
                    attach_type: h.new.attach_type.clone(),
                    in_use: h.new.in_use,
                });
            }
            for (_, h) in &handles.deleted {
                self.store_ops
                    .push(StoreOp::DestroyAttachHandle { handle_id: h.id });
            }
            for (_, h) in &handles.added {
                self.store_ops.push(StoreOp::CreateAttachHandle {
                    deployable_id,
                    cpid_id,
                    handle: (*h).clone(),
                });
            }
        }

        for (_, gone) in &deployables.deleted {
            self.plan_destroy_deployable(gone);
            self.placement_ops.push(PlacementOp::remove(deployable_provider_name(
                &gone.deployable.name,
            )));
        }
        for (_, fresh) in &deployables.added {
            self.store_ops.push(StoreOp::CreateDeployable {
                device_id,
                cpid_id,
                deployable: (*fresh).clone(),
            });
        }

        // A type change renames the device provider; the old one is orphaned.
        if old.device.fields.device_type != new.fields.device_type {
            self.placement_ops.push(PlacementOp::remove(device_provider_name(
                old.device.fields.device_type,
                &old.controlpath_id.cpid_info,
            )));
        }
        if placement_changed {
            self.placement_ops.push(PlacementOp::ReportDevice {
                device: new.clone(),
            });
        }
        Ok(())
    }

    fn plan_destroy_deployable(&mut self, gone: &StoredDeployable) {
        for h in &gone.attach_handles {
            self.store_ops
                .push(StoreOp::DestroyAttachHandle { handle_id: h.id });
        }
        for a in &gone.attributes {
            self.store_ops
                .push(StoreOp::DestroyAttribute { attribute_id: a.id });
        }
        self.store_ops.push(StoreOp::DestroyDeployable {
            deployable_id: gone.deployable.id,
        });
    }

    fn plan_destroy_device(&mut self, gone: &StoredDevice) {
        for deployable in &gone.deployables {
            self.plan_destroy_deployable(deployable);
        }
        self.store_ops.push(StoreOp::DestroyControlpathId {
            cpid_id: gone.controlpath_id.id,
        });
        self.store_ops.push(StoreOp::DestroyDevice {
            device_id: gone.device.id,
        });
        self.placement_ops.push(PlacementOp::remove(device_provider_name(
            gone.device.fields.device_type,
            &gone.controlpath_id.cpid_info,
        )));
    }
}
