// ── Persisted inventory records ──
//
// The stored mirror of the discovered tree. Each row carries a
// store-assigned numeric id, a UUID, foreign keys to its parent, and
// timestamps. `New*` structs are the inputs to the store's create calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::driver::{DeviceFields, DriverAttachHandle, DriverAttribute};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub uuid: Uuid,
    pub hostname: String,
    #[serde(flatten)]
    pub fields: DeviceFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlpathId {
    pub id: i64,
    pub uuid: Uuid,
    pub device_id: i64,
    pub cpid_type: String,
    /// Canonical locator string.
    pub cpid_info: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployable {
    pub id: i64,
    pub uuid: Uuid,
    pub device_id: i64,
    pub name: String,
    pub num_accelerators: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: i64,
    pub uuid: Uuid,
    pub deployable_id: i64,
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachHandle {
    pub id: i64,
    pub uuid: Uuid,
    pub deployable_id: i64,
    pub cpid_id: i64,
    pub attach_type: String,
    pub attach_info: String,
    pub in_use: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

// ── Create inputs ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NewDevice {
    pub hostname: String,
    pub fields: DeviceFields,
}

#[derive(Debug, Clone)]
pub struct NewControlpathId {
    pub device_id: i64,
    pub cpid_type: String,
    pub cpid_info: String,
}

#[derive(Debug, Clone)]
pub struct NewDeployable {
    pub device_id: i64,
    pub name: String,
    pub num_accelerators: u32,
}

#[derive(Debug, Clone)]
pub struct NewAttribute {
    pub deployable_id: i64,
    pub key: String,
    pub value: String,
}

impl NewAttribute {
    pub fn from_driver(deployable_id: i64, attr: &DriverAttribute) -> Self {
        Self {
            deployable_id,
            key: attr.key.clone(),
            value: attr.value.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAttachHandle {
    pub deployable_id: i64,
    pub cpid_id: i64,
    pub attach_type: String,
    pub attach_info: String,
    pub in_use: bool,
}

impl NewAttachHandle {
    pub fn from_driver(deployable_id: i64, cpid_id: i64, handle: &DriverAttachHandle) -> Self {
        Self {
            deployable_id,
            cpid_id,
            attach_type: handle.attach_type.clone(),
            attach_info: handle.attach_info.clone(),
            in_use: handle.in_use,
        }
    }
}

// ── Assembled host tree ──────────────────────────────────────────────

/// A persisted device with its full subtree, as loaded for diffing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredDevice {
    pub device: Device,
    pub controlpath_id: ControlpathId,
    pub deployables: Vec<StoredDeployable>,
}

/// A device row whose controlpath id is missing, left behind by a pass
/// that failed between creating the two rows (or between destroying
/// them). It has no identity to diff on and is discarded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrphanedDevice {
    pub device: Device,
    pub deployables: Vec<StoredDeployable>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredDeployable {
    pub deployable: Deployable,
    pub attributes: Vec<Attribute>,
    pub attach_handles: Vec<AttachHandle>,
}
