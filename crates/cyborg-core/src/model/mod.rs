// ── Domain model ──
//
// Two parallel shapes of the same tree: what discovery reports this pass
// (`driver`) and what the store remembers from earlier passes (`record`).

pub mod controlpath;
pub mod driver;
pub mod record;

pub use controlpath::{InvalidPciAddress, PciAddress, canonical_locator};
pub use driver::{
    DeviceFields, DeviceType, DriverAttachHandle, DriverAttribute, DriverControlpathId,
    DriverDeployable, DriverDevice,
};
pub use record::{
    AttachHandle, Attribute, ControlpathId, Deployable, Device, NewAttachHandle, NewAttribute,
    NewControlpathId, NewDeployable, NewDevice, OrphanedDevice, StoredDeployable, StoredDevice,
};
