// Per-layer identity and compared-field sets, persisted vs discovered.

use super::{DiffError, Layer, LayerDiff, diff_layer};
use crate::model::{
    AttachHandle, Attribute, Device, DriverAttachHandle, DriverAttribute, DriverDeployable,
    DriverDevice, StoredDeployable, StoredDevice, canonical_locator,
};

/// vendor, model, vendor_board_info, std_board_info, type.
pub fn device_dirty(old: &Device, new: &DriverDevice) -> bool {
    old.fields != new.fields
}

pub fn deployable_dirty(old: &StoredDeployable, new: &DriverDeployable) -> bool {
    old.deployable.num_accelerators != new.num_accelerators
}

pub fn attribute_dirty(old: &Attribute, new: &DriverAttribute) -> bool {
    old.value != new.value
}

pub fn attach_handle_dirty(old: &AttachHandle, new: &DriverAttachHandle) -> bool {
    old.attach_type != new.attach_type || old.in_use != new.in_use
}

pub fn diff_devices<'a>(
    old: &'a [StoredDevice],
    new: &'a [DriverDevice],
) -> Result<LayerDiff<'a, StoredDevice, DriverDevice>, DiffError> {
    diff_layer(
        Layer::Device,
        old,
        new,
        |o| canonical_locator(&o.controlpath_id.cpid_info),
        DriverDevice::identity,
        |o, n| device_dirty(&o.device, n),
    )
}

pub fn diff_deployables<'a>(
    old: &'a [StoredDeployable],
    new: &'a [DriverDeployable],
) -> Result<LayerDiff<'a, StoredDeployable, DriverDeployable>, DiffError> {
    diff_layer(
        Layer::Deployable,
        old,
        new,
        |o| o.deployable.name.clone(),
        |n| n.name.clone(),
        deployable_dirty,
    )
}

pub fn diff_attributes<'a>(
    old: &'a [Attribute],
    new: &'a [DriverAttribute],
) -> Result<LayerDiff<'a, Attribute, DriverAttribute>, DiffError> {
    diff_layer(
        Layer::Attribute,
        old,
        new,
        |o| o.key.clone(),
        |n| n.key.clone(),
        attribute_dirty,
    )
}

pub fn diff_attach_handles<'a>(
    old: &'a [AttachHandle],
    new: &'a [DriverAttachHandle],
) -> Result<LayerDiff<'a, AttachHandle, DriverAttachHandle>, DiffError> {
    diff_layer(
        Layer::AttachHandle,
        old,
        new,
        |o| canonical_locator(&o.attach_info),
        DriverAttachHandle::identity,
        attach_handle_dirty,
    )
}
