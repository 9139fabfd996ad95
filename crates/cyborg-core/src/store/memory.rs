// ── In-memory inventory store ──
//
// DashMap-backed tables keyed by a shared id sequence. Foreign keys are
// enforced on create and destroy, so an out-of-order apply fails loudly
// instead of leaving orphans. The whole store round-trips through a JSON
// snapshot, which gives the CLI durable state between passes.

use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::InventoryStore;
use crate::error::CoreError;
use crate::model::{
    AttachHandle, Attribute, ControlpathId, Deployable, Device, NewAttachHandle, NewAttribute,
    NewControlpathId, NewDeployable, NewDevice,
};

// ── Table ────────────────────────────────────────────────────────────

trait Row: Clone {
    const KIND: &'static str;
    fn id(&self) -> i64;
    fn created_at(&self) -> DateTime<Utc>;
    fn stamp(&mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>);
}

macro_rules! impl_row {
    ($ty:ty, $kind:literal) => {
        impl Row for $ty {
            const KIND: &'static str = $kind;

            fn id(&self) -> i64 {
                self.id
            }

            fn created_at(&self) -> DateTime<Utc> {
                self.created_at
            }

            fn stamp(&mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) {
                self.created_at = created_at;
                self.updated_at = Some(updated_at);
            }
        }
    };
}

impl_row!(Device, "device");
impl_row!(ControlpathId, "controlpath_id");
impl_row!(Deployable, "deployable");
impl_row!(Attribute, "attribute");
impl_row!(AttachHandle, "attach_handle");

struct Table<T> {
    rows: DashMap<i64, T>,
}

impl<T: Row> Table<T> {
    fn from_rows(rows: Vec<T>) -> Self {
        Self {
            rows: rows.into_iter().map(|r| (r.id(), r)).collect(),
        }
    }

    fn contains(&self, id: i64) -> bool {
        self.rows.contains_key(&id)
    }

    fn get(&self, id: i64) -> Option<T> {
        self.rows.get(&id).map(|r| r.value().clone())
    }

    fn insert(&self, row: T) {
        self.rows.insert(row.id(), row);
    }

    /// Overwrite an existing row, keeping its creation time.
    fn replace(&self, row: &T) -> Result<(), CoreError> {
        let mut entry = self.rows.get_mut(&row.id()).ok_or_else(|| CoreError::NotFound {
            entity_type: T::KIND.into(),
            identifier: row.id().to_string(),
        })?;
        let created_at = entry.created_at();
        let mut updated = row.clone();
        updated.stamp(created_at, Utc::now());
        *entry = updated;
        Ok(())
    }

    fn remove(&self, id: i64) -> bool {
        self.rows.remove(&id).is_some()
    }

    fn any(&self, pred: impl Fn(&T) -> bool) -> bool {
        self.rows.iter().any(|r| pred(r.value()))
    }

    /// Matching rows in id order.
    fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        let mut rows: Vec<T> = self
            .rows
            .iter()
            .filter(|r| pred(r.value()))
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by_key(T::id);
        rows
    }

    fn all(&self) -> Vec<T> {
        self.filter(|_| true)
    }
}

fn missing_parent(kind: &str, id: i64) -> CoreError {
    CoreError::NotFound {
        entity_type: kind.into(),
        identifier: id.to_string(),
    }
}

fn still_referenced(kind: &str, id: i64, by: &str) -> CoreError {
    CoreError::Storage {
        message: format!("cannot destroy {kind} {id}: still referenced by {by}"),
    }
}

// ── Snapshot ─────────────────────────────────────────────────────────

/// Serializable image of the whole store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub next_id: i64,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub controlpath_ids: Vec<ControlpathId>,
    #[serde(default)]
    pub deployables: Vec<Deployable>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    #[serde(default)]
    pub attach_handles: Vec<AttachHandle>,
}

// ── MemoryStore ──────────────────────────────────────────────────────

pub struct MemoryStore {
    devices: Table<Device>,
    controlpath_ids: Table<ControlpathId>,
    deployables: Table<Deployable>,
    attributes: Table<Attribute>,
    attach_handles: Table<AttachHandle>,
    next_id: AtomicI64,
    writes: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::from_snapshot(StoreSnapshot::default())
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            devices: Table::from_rows(snapshot.devices),
            controlpath_ids: Table::from_rows(snapshot.controlpath_ids),
            deployables: Table::from_rows(snapshot.deployables),
            attributes: Table::from_rows(snapshot.attributes),
            attach_handles: Table::from_rows(snapshot.attach_handles),
            next_id: AtomicI64::new(snapshot.next_id),
            writes: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            next_id: self.next_id.load(Ordering::SeqCst),
            devices: self.devices.all(),
            controlpath_ids: self.controlpath_ids.all(),
            deployables: self.deployables.all(),
            attributes: self.attributes.all(),
            attach_handles: self.attach_handles.all(),
        }
    }

    /// Load a state file. A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            debug!(path = %path.display(), "no state file, starting empty");
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| CoreError::Storage {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        let snapshot: StoreSnapshot =
            serde_json::from_str(&raw).map_err(|e| CoreError::Storage {
                message: format!("corrupt state file {}: {e}", path.display()),
            })?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let io_err = |e: std::io::Error| CoreError::Storage {
            message: format!("failed to write {}: {e}", path.display()),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| CoreError::Internal(format!("state serialization failed: {e}")))?;
        std::fs::write(path, json).map_err(io_err)
    }

    /// Number of successful mutations since this store was built.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Every persisted device, across hosts.
    pub fn all_devices(&self) -> Vec<Device> {
        self.devices.all()
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn bump(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn bump_if(&self, removed: bool) -> bool {
        if removed {
            self.bump();
        }
        removed
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    // ── Devices ──────────────────────────────────────────────────────

    async fn create_device(&self, new: NewDevice) -> Result<Device, CoreError> {
        let device = Device {
            id: self.next_id(),
            uuid: Uuid::new_v4(),
            hostname: new.hostname,
            fields: new.fields,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.devices.insert(device.clone());
        self.bump();
        Ok(device)
    }

    async fn get_device(&self, id: i64) -> Result<Option<Device>, CoreError> {
        Ok(self.devices.get(id))
    }

    async fn update_device(&self, device: &Device) -> Result<(), CoreError> {
        self.devices.replace(device)?;
        self.bump();
        Ok(())
    }

    async fn destroy_device(&self, id: i64) -> Result<bool, CoreError> {
        if self.controlpath_ids.any(|c| c.device_id == id) {
            return Err(still_referenced("device", id, "a controlpath id"));
        }
        if self.deployables.any(|d| d.device_id == id) {
            return Err(still_referenced("device", id, "deployables"));
        }
        Ok(self.bump_if(self.devices.remove(id)))
    }

    async fn list_devices_by_host(&self, host: &str) -> Result<Vec<Device>, CoreError> {
        Ok(self.devices.filter(|d| d.hostname == host))
    }

    // ── Controlpath ids ──────────────────────────────────────────────

    async fn create_controlpath_id(
        &self,
        new: NewControlpathId,
    ) -> Result<ControlpathId, CoreError> {
        if !self.devices.contains(new.device_id) {
            return Err(missing_parent("device", new.device_id));
        }
        let cpid = ControlpathId {
            id: self.next_id(),
            uuid: Uuid::new_v4(),
            device_id: new.device_id,
            cpid_type: new.cpid_type,
            cpid_info: new.cpid_info,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.controlpath_ids.insert(cpid.clone());
        self.bump();
        Ok(cpid)
    }

    async fn get_controlpath_id_by_device(
        &self,
        device_id: i64,
    ) -> Result<Option<ControlpathId>, CoreError> {
        Ok(self
            .controlpath_ids
            .filter(|c| c.device_id == device_id)
            .into_iter()
            .next())
    }

    async fn destroy_controlpath_id(&self, id: i64) -> Result<bool, CoreError> {
        if self.attach_handles.any(|h| h.cpid_id == id) {
            return Err(still_referenced("controlpath_id", id, "attach handles"));
        }
        Ok(self.bump_if(self.controlpath_ids.remove(id)))
    }

    // ── Deployables ──────────────────────────────────────────────────

    async fn create_deployable(&self, new: NewDeployable) -> Result<Deployable, CoreError> {
        if !self.devices.contains(new.device_id) {
            return Err(missing_parent("device", new.device_id));
        }
        let deployable = Deployable {
            id: self.next_id(),
            uuid: Uuid::new_v4(),
            device_id: new.device_id,
            name: new.name,
            num_accelerators: new.num_accelerators,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.deployables.insert(deployable.clone());
        self.bump();
        Ok(deployable)
    }

    async fn get_deployable(&self, id: i64) -> Result<Option<Deployable>, CoreError> {
        Ok(self.deployables.get(id))
    }

    async fn update_deployable(&self, deployable: &Deployable) -> Result<(), CoreError> {
        self.deployables.replace(deployable)?;
        self.bump();
        Ok(())
    }

    async fn destroy_deployable(&self, id: i64) -> Result<bool, CoreError> {
        if self.attributes.any(|a| a.deployable_id == id) {
            return Err(still_referenced("deployable", id, "attributes"));
        }
        if self.attach_handles.any(|h| h.deployable_id == id) {
            return Err(still_referenced("deployable", id, "attach handles"));
        }
        Ok(self.bump_if(self.deployables.remove(id)))
    }

    async fn list_deployables_by_device(
        &self,
        device_id: i64,
    ) -> Result<Vec<Deployable>, CoreError> {
        Ok(self.deployables.filter(|d| d.device_id == device_id))
    }

    // ── Attributes ───────────────────────────────────────────────────

    async fn create_attribute(&self, new: NewAttribute) -> Result<Attribute, CoreError> {
        if !self.deployables.contains(new.deployable_id) {
            return Err(missing_parent("deployable", new.deployable_id));
        }
        let attribute = Attribute {
            id: self.next_id(),
            uuid: Uuid::new_v4(),
            deployable_id: new.deployable_id,
            key: new.key,
            value: new.value,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.attributes.insert(attribute.clone());
        self.bump();
        Ok(attribute)
    }

    async fn get_attribute(&self, id: i64) -> Result<Option<Attribute>, CoreError> {
        Ok(self.attributes.get(id))
    }

    async fn update_attribute(&self, attribute: &Attribute) -> Result<(), CoreError> {
        self.attributes.replace(attribute)?;
        self.bump();
        Ok(())
    }

    async fn destroy_attribute(&self, id: i64) -> Result<bool, CoreError> {
        Ok(self.bump_if(self.attributes.remove(id)))
    }

    async fn list_attributes_by_deployable(
        &self,
        deployable_id: i64,
    ) -> Result<Vec<Attribute>, CoreError> {
        Ok(self.attributes.filter(|a| a.deployable_id == deployable_id))
    }

    // ── Attach handles ───────────────────────────────────────────────

    async fn create_attach_handle(
        &self,
        new: NewAttachHandle,
    ) -> Result<AttachHandle, CoreError> {
        if !self.deployables.contains(new.deployable_id) {
            return Err(missing_parent("deployable", new.deployable_id));
        }
        if !self.controlpath_ids.contains(new.cpid_id) {
            return Err(missing_parent("controlpath_id", new.cpid_id));
        }
        let handle = AttachHandle {
            id: self.next_id(),
            uuid: Uuid::new_v4(),
            deployable_id: new.deployable_id,
            cpid_id: new.cpid_id,
            attach_type: new.attach_type,
            attach_info: new.attach_info,
            in_use: new.in_use,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.attach_handles.insert(handle.clone());
        self.bump();
        Ok(handle)
    }

    async fn get_attach_handle(&self, id: i64) -> Result<Option<AttachHandle>, CoreError> {
        Ok(self.attach_handles.get(id))
    }

    async fn update_attach_handle(&self, handle: &AttachHandle) -> Result<(), CoreError> {
        self.attach_handles.replace(handle)?;
        self.bump();
        Ok(())
    }

    async fn destroy_attach_handle(&self, id: i64) -> Result<bool, CoreError> {
        Ok(self.bump_if(self.attach_handles.remove(id)))
    }

    async fn list_attach_handles_by_deployable(
        &self,
        deployable_id: i64,
    ) -> Result<Vec<AttachHandle>, CoreError> {
        Ok(self
            .attach_handles
            .filter(|h| h.deployable_id == deployable_id))
    }
}
