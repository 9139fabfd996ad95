// ── Inventory store ──
//
// Key-based CRUD over the five persisted entity kinds. The conductor only
// ever talks to `dyn InventoryStore`; `MemoryStore` is the bundled
// implementation.

mod memory;

use async_trait::async_trait;
use tracing::warn;

pub use memory::{MemoryStore, StoreSnapshot};

use crate::error::CoreError;
use crate::model::{
    AttachHandle, Attribute, ControlpathId, Deployable, Device, NewAttachHandle, NewAttribute,
    NewControlpathId, NewDeployable, NewDevice, OrphanedDevice, StoredDeployable, StoredDevice,
};

/// Persistent storage for the accelerator inventory.
///
/// `update_*` on a missing id fails with `CoreError::NotFound`.
/// `destroy_*` returns `false` when the row was already gone and fails with
/// `CoreError::Storage` while child rows still reference it.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    // ── Devices ──────────────────────────────────────────────────────
    async fn create_device(&self, new: NewDevice) -> Result<Device, CoreError>;
    async fn get_device(&self, id: i64) -> Result<Option<Device>, CoreError>;
    async fn update_device(&self, device: &Device) -> Result<(), CoreError>;
    async fn destroy_device(&self, id: i64) -> Result<bool, CoreError>;
    async fn list_devices_by_host(&self, host: &str) -> Result<Vec<Device>, CoreError>;

    // ── Controlpath ids ──────────────────────────────────────────────
    async fn create_controlpath_id(&self, new: NewControlpathId)
    -> Result<ControlpathId, CoreError>;
    async fn get_controlpath_id_by_device(
        &self,
        device_id: i64,
    ) -> Result<Option<ControlpathId>, CoreError>;
    async fn destroy_controlpath_id(&self, id: i64) -> Result<bool, CoreError>;

    // ── Deployables ──────────────────────────────────────────────────
    async fn create_deployable(&self, new: NewDeployable) -> Result<Deployable, CoreError>;
    async fn get_deployable(&self, id: i64) -> Result<Option<Deployable>, CoreError>;
    async fn update_deployable(&self, deployable: &Deployable) -> Result<(), CoreError>;
    async fn destroy_deployable(&self, id: i64) -> Result<bool, CoreError>;
    async fn list_deployables_by_device(&self, device_id: i64)
    -> Result<Vec<Deployable>, CoreError>;

    // ── Attributes ───────────────────────────────────────────────────
    async fn create_attribute(&self, new: NewAttribute) -> Result<Attribute, CoreError>;
    async fn get_attribute(&self, id: i64) -> Result<Option<Attribute>, CoreError>;
    async fn update_attribute(&self, attribute: &Attribute) -> Result<(), CoreError>;
    async fn destroy_attribute(&self, id: i64) -> Result<bool, CoreError>;
    async fn list_attributes_by_deployable(
        &self,
        deployable_id: i64,
    ) -> Result<Vec<Attribute>, CoreError>;

    // ── Attach handles ───────────────────────────────────────────────
    async fn create_attach_handle(&self, new: NewAttachHandle)
    -> Result<AttachHandle, CoreError>;
    async fn get_attach_handle(&self, id: i64) -> Result<Option<AttachHandle>, CoreError>;
    async fn update_attach_handle(&self, handle: &AttachHandle) -> Result<(), CoreError>;
    async fn destroy_attach_handle(&self, id: i64) -> Result<bool, CoreError>;
    async fn list_attach_handles_by_deployable(
        &self,
        deployable_id: i64,
    ) -> Result<Vec<AttachHandle>, CoreError>;
}

/// Everything persisted for one host, split by whether a device row can
/// be diffed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostInventory {
    pub devices: Vec<StoredDevice>,
    pub orphans: Vec<OrphanedDevice>,
}

/// Assemble the persisted device tree for `host`, setting aside device
/// rows that have no controlpath id.
pub async fn load_host_inventory(
    store: &dyn InventoryStore,
    host: &str,
) -> Result<HostInventory, CoreError> {
    let mut inventory = HostInventory::default();
    for device in store.list_devices_by_host(host).await? {
        let mut deployables = Vec::new();
        for deployable in store.list_deployables_by_device(device.id).await? {
            let attributes = store.list_attributes_by_deployable(deployable.id).await?;
            let attach_handles = store
                .list_attach_handles_by_deployable(deployable.id)
                .await?;
            deployables.push(StoredDeployable {
                deployable,
                attributes,
                attach_handles,
            });
        }

        match store.get_controlpath_id_by_device(device.id).await? {
            Some(controlpath_id) => inventory.devices.push(StoredDevice {
                device,
                controlpath_id,
                deployables,
            }),
            None => {
                warn!(host, device = device.id, "device row has no controlpath id");
                inventory.orphans.push(OrphanedDevice {
                    device,
                    deployables,
                });
            }
        }
    }
    Ok(inventory)
}

/// The diffable part of [`load_host_inventory`].
pub async fn load_host_tree(
    store: &dyn InventoryStore,
    host: &str,
) -> Result<Vec<StoredDevice>, CoreError> {
    Ok(load_host_inventory(store, host).await?.devices)
}
