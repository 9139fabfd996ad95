// ── Discovered device tree ──
//
// The shape a host agent reports each pass. No ids, no timestamps: only
// what the hardware says about itself.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::controlpath::canonical_locator;

/// Accelerator family reported by the discovery driver.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum DeviceType {
    Gpu,
    Fpga,
    Aichip,
    Qat,
}

impl DeviceType {
    /// The Placement resource class a device of this type is reported
    /// under, if one is defined.
    pub fn resource_class(self) -> Option<&'static str> {
        match self {
            Self::Fpga => Some("FPGA"),
            Self::Gpu => Some("PGPU"),
            Self::Aichip | Self::Qat => None,
        }
    }
}

/// The mutable descriptive fields of a device, compared for dirtiness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFields {
    #[serde(rename = "type")]
    pub device_type: DeviceType,
    pub vendor: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub std_board_info: String,
    #[serde(default)]
    pub vendor_board_info: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverControlpathId {
    #[serde(default = "pci")]
    pub cpid_type: String,
    pub cpid_info: String,
}

fn pci() -> String {
    "PCI".into()
}

impl DriverControlpathId {
    pub fn identity(&self) -> String {
        canonical_locator(&self.cpid_info)
    }
}

/// A physical device as reported by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverDevice {
    #[serde(flatten)]
    pub fields: DeviceFields,
    pub controlpath_id: DriverControlpathId,
    #[serde(default)]
    pub deployables: Vec<DriverDeployable>,
}

impl DriverDevice {
    pub fn identity(&self) -> String {
        self.controlpath_id.identity()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverDeployable {
    pub name: String,
    pub num_accelerators: u32,
    #[serde(default)]
    pub attributes: Vec<DriverAttribute>,
    #[serde(default)]
    pub attach_handles: Vec<DriverAttachHandle>,
}

impl DriverDeployable {
    /// Resource class named by the `rc` attribute.
    pub fn resource_class(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == "rc")
            .map(|a| a.value.as_str())
    }

    /// Trait names carried by `trait*` attributes, in attribute order.
    pub fn traits(&self) -> Vec<String> {
        self.attributes
            .iter()
            .filter(|a| a.key.starts_with("trait"))
            .map(|a| a.value.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverAttribute {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverAttachHandle {
    pub attach_type: String,
    pub attach_info: String,
    #[serde(default)]
    pub in_use: bool,
}

impl DriverAttachHandle {
    pub fn identity(&self) -> String {
        canonical_locator(&self.attach_info)
    }
}
