// Tree builders shared by unit tests.

use std::cell::Cell;

use chrono::Utc;
use uuid::Uuid;

use crate::model::{
    AttachHandle, Attribute, ControlpathId, Deployable, Device, DeviceFields, DeviceType,
    DriverAttachHandle, DriverAttribute, DriverControlpathId, DriverDeployable, DriverDevice,
    StoredDeployable, StoredDevice, canonical_locator,
};

pub fn attr(key: &str, value: &str) -> DriverAttribute {
    DriverAttribute {
        key: key.into(),
        value: value.into(),
    }
}

pub fn handle(info: &str) -> DriverAttachHandle {
    DriverAttachHandle {
        attach_type: "PCI".into(),
        attach_info: info.into(),
        in_use: false,
    }
}

pub fn deployable(
    name: &str,
    num_accelerators: u32,
    attributes: Vec<DriverAttribute>,
    attach_handles: Vec<DriverAttachHandle>,
) -> DriverDeployable {
    DriverDeployable {
        name: name.into(),
        num_accelerators,
        attributes,
        attach_handles,
    }
}

pub fn device(cpid: &str, deployables: Vec<DriverDeployable>) -> DriverDevice {
    DriverDevice {
        fields: DeviceFields {
            device_type: DeviceType::Fpga,
            vendor: "8086".into(),
            model: "PAC Arria10".into(),
            std_board_info: r#"{"device_id": "09c4", "class": "Processing accelerators"}"#.into(),
            vendor_board_info: "fake_vendor_info".into(),
        },
        controlpath_id: DriverControlpathId {
            cpid_type: "PCI".into(),
            cpid_info: cpid.into(),
        },
        deployables,
    }
}

/// Mirror a discovered tree as if an earlier pass had stored it, with
/// sequential ids.
pub fn persist(host: &str, tree: &[DriverDevice]) -> Vec<StoredDevice> {
    let next = Cell::new(0_i64);
    let id = || {
        next.set(next.get() + 1);
        next.get()
    };
    let now = Utc::now();

    tree.iter()
        .map(|dev| {
            let device_id = id();
            let cpid_id = id();
            let deployables = dev
                .deployables
                .iter()
                .map(|dep| {
                    let deployable_id = id();
                    StoredDeployable {
                        deployable: Deployable {
                            id: deployable_id,
                            uuid: Uuid::new_v4(),
                            device_id,
                            name: dep.name.clone(),
                            num_accelerators: dep.num_accelerators,
                            created_at: now,
                            updated_at: None,
                        },
                        attributes: dep
                            .attributes
                            .iter()
                            .map(|a| Attribute {
                                id: id(),
                                uuid: Uuid::new_v4(),
                                deployable_id,
                                key: a.key.clone(),
                                value: a.value.clone(),
                                created_at: now,
                                updated_at: None,
                            })
                            .collect(),
                        attach_handles: dep
                            .attach_handles
                            .iter()
                            .map(|h| AttachHandle {
                                id: id(),
                                uuid: Uuid::new_v4(),
                                deployable_id,
                                cpid_id,
                                attach_type: h.attach_type.clone(),
                                attach_info: h.attach_info.clone(),
                                in_use: h.in_use,
                                created_at: now,
                                updated_at: None,
                            })
                            .collect(),
                    }
                })
                .collect();

            StoredDevice {
                device: Device {
                    id: device_id,
                    uuid: Uuid::new_v4(),
                    hostname: host.into(),
                    fields: dev.fields.clone(),
                    created_at: now,
                    updated_at: None,
                },
                controlpath_id: ControlpathId {
                    id: cpid_id,
                    uuid: Uuid::new_v4(),
                    device_id,
                    cpid_type: dev.controlpath_id.cpid_type.clone(),
                    cpid_info: canonical_locator(&dev.controlpath_id.cpid_info),
                    created_at: now,
                    updated_at: None,
                },
                deployables,
            }
        })
        .collect()
}
