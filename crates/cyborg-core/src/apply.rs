// ── Persistence application ──
//
// Executes a plan's store operations in order, one awaited call at a time.
// No transaction spans layers: a failure stops the sequence and leaves the
// earlier writes in place. The next pass re-diffs from whatever landed.

use serde::Serialize;
use tracing::{debug, error};

use crate::error::CoreError;
use crate::model::{
    DriverDeployable, DriverDevice, NewAttachHandle, NewAttribute, NewControlpathId,
    NewDeployable, NewDevice, canonical_locator,
};
use crate::plan::StoreOp;
use crate::store::InventoryStore;

/// Row counts written by one application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    pub created: usize,
    pub updated: usize,
    pub destroyed: usize,
}

impl ApplyOutcome {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.destroyed
    }
}

fn not_found(entity_type: &str, id: i64) -> CoreError {
    CoreError::NotFound {
        entity_type: entity_type.into(),
        identifier: id.to_string(),
    }
}

/// Apply `ops` for `host` against `store`.
pub async fn apply_store_ops(
    store: &dyn InventoryStore,
    host: &str,
    ops: &[StoreOp],
) -> Result<ApplyOutcome, CoreError> {
    let mut outcome = ApplyOutcome::default();
    for op in ops {
        if let Err(e) = apply_one(store, host, op, &mut outcome).await {
            error!(host, op = ?op, error = %e, "store operation failed");
            return Err(e);
        }
    }
    Ok(outcome)
}

async fn apply_one(
    store: &dyn InventoryStore,
    host: &str,
    op: &StoreOp,
    outcome: &mut ApplyOutcome,
) -> Result<(), CoreError> {
    match op {
        // ── Creates (top-down) ───────────────────────────────────────
        StoreOp::CreateDevice { device } => {
            create_device_tree(store, host, device, outcome).await?;
        }
        StoreOp::CreateDeployable {
            device_id,
            cpid_id,
            deployable,
        } => {
            create_deployable_tree(store, *device_id, *cpid_id, deployable, outcome).await?;
        }
        StoreOp::CreateAttribute {
            deployable_id,
            attribute,
        } => {
            store
                .create_attribute(NewAttribute::from_driver(*deployable_id, attribute))
                .await?;
            outcome.created += 1;
        }
        StoreOp::CreateAttachHandle {
            deployable_id,
            cpid_id,
            handle,
        } => {
            store
                .create_attach_handle(NewAttachHandle::from_driver(
                    *deployable_id,
                    *cpid_id,
                    handle,
                ))
                .await?;
            outcome.created += 1;
        }

        // ── Updates: load, overwrite, save ───────────────────────────
        StoreOp::UpdateDevice { device_id, fields } => {
            let mut device = store
                .get_device(*device_id)
                .await?
                .ok_or_else(|| not_found("device", *device_id))?;
            device.fields = fields.clone();
            store.update_device(&device).await?;
            outcome.updated += 1;
        }
        StoreOp::UpdateDeployable {
            deployable_id,
            num_accelerators,
        } => {
            let mut deployable = store
                .get_deployable(*deployable_id)
                .await?
                .ok_or_else(|| not_found("deployable", *deployable_id))?;
            deployable.num_accelerators = *num_accelerators;
            store.update_deployable(&deployable).await?;
            outcome.updated += 1;
        }
        StoreOp::UpdateAttribute {
            attribute_id,
            value,
        } => {
            let mut attribute = store
                .get_attribute(*attribute_id)
                .await?
                .ok_or_else(|| not_found("attribute", *attribute_id))?;
            attribute.value.clone_from(value);
            store.update_attribute(&attribute).await?;
            outcome.updated += 1;
        }
        StoreOp::UpdateAttachHandle {
            handle_id,
            attach_type,
            in_use,
        } => {
            let mut handle = store
                .get_attach_handle(*handle_id)
                .await?
                .ok_or_else(|| not_found("attach_handle", *handle_id))?;
            handle.attach_type.clone_from(attach_type);
            handle.in_use = *in_use;
            store.update_attach_handle(&handle).await?;
            outcome.updated += 1;
        }

        // ── Destroys (bottom-up); already-gone rows are fine ─────────
        StoreOp::DestroyAttachHandle { handle_id } => {
            let existed = store.destroy_attach_handle(*handle_id).await?;
            count_destroy(outcome, "attach_handle", *handle_id, existed);
        }
        StoreOp::DestroyAttribute { attribute_id } => {
            let existed = store.destroy_attribute(*attribute_id).await?;
            count_destroy(outcome, "attribute", *attribute_id, existed);
        }
        StoreOp::DestroyDeployable { deployable_id } => {
            let existed = store.destroy_deployable(*deployable_id).await?;
            count_destroy(outcome, "deployable", *deployable_id, existed);
        }
        StoreOp::DestroyControlpathId { cpid_id } => {
            let existed = store.destroy_controlpath_id(*cpid_id).await?;
            count_destroy(outcome, "controlpath_id", *cpid_id, existed);
        }
        StoreOp::DestroyDevice { device_id } => {
            let existed = store.destroy_device(*device_id).await?;
            count_destroy(outcome, "device", *device_id, existed);
        }
    }
    Ok(())
}

fn count_destroy(outcome: &mut ApplyOutcome, kind: &str, id: i64, existed: bool) {
    if existed {
        outcome.destroyed += 1;
    } else {
        debug!(kind, id, "already absent");
    }
}

async fn create_device_tree(
    store: &dyn InventoryStore,
    host: &str,
    device: &DriverDevice,
    outcome: &mut ApplyOutcome,
) -> Result<(), CoreError> {
    let row = store
        .create_device(NewDevice {
            hostname: host.to_owned(),
            fields: device.fields.clone(),
        })
        .await?;
    let cpid = store
        .create_controlpath_id(NewControlpathId {
            device_id: row.id,
            cpid_type: device.controlpath_id.cpid_type.clone(),
            cpid_info: canonical_locator(&device.controlpath_id.cpid_info),
        })
        .await?;
    outcome.created += 2;

    for deployable in &device.deployables {
        create_deployable_tree(store, row.id, cpid.id, deployable, outcome).await?;
    }
    Ok(())
}

async fn create_deployable_tree(
    store: &dyn InventoryStore,
    device_id: i64,
    cpid_id: i64,
    deployable: &DriverDeployable,
    outcome: &mut ApplyOutcome,
) -> Result<(), CoreError> {
    let row = store
        .create_deployable(NewDeployable {
            device_id,
            name: deployable.name.clone(),
            num_accelerators: deployable.num_accelerators,
        })
        .await?;
    outcome.created += 1;

    for attribute in &deployable.attributes {
        store
            .create_attribute(NewAttribute::from_driver(row.id, attribute))
            .await?;
        outcome.created += 1;
    }
    for handle in &deployable.attach_handles {
        store
            .create_attach_handle(NewAttachHandle::from_driver(row.id, cpid_id, handle))
            .await?;
        outcome.created += 1;
    }
    Ok(())
}
