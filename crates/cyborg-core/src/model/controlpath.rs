// ── Control-path locators ──
//
// Devices are identified by where the management plane reaches them.
// PCI locators arrive as bare BDF strings from sysfs or as the JSON object
// persisted by earlier passes. Both collapse to one canonical string so
// identity comparison never depends on spelling or key order.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// A PCI function address (`domain:bus:device.function`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PciAddress {
    pub domain: u16,
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

#[derive(Deserialize)]
struct PciFields {
    domain: String,
    bus: String,
    device: String,
    function: String,
}

impl PciAddress {
    /// Parse either a BDF string (`0000:5e:00.1`, domain optional) or the
    /// JSON object form. Hex digits are case-insensitive.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.starts_with('{') {
            Self::parse_json(raw)
        } else {
            Self::parse_bdf(raw)
        }
    }

    fn parse_bdf(raw: &str) -> Option<Self> {
        let (head, function) = raw.rsplit_once('.')?;
        let parts: Vec<&str> = head.split(':').collect();
        let (domain, bus, device) = match parts.as_slice() {
            [domain, bus, device] => (*domain, *bus, *device),
            [bus, device] => ("0", *bus, *device),
            _ => return None,
        };
        Self::from_parts(domain, bus, device, function)
    }

    fn parse_json(raw: &str) -> Option<Self> {
        let fields: PciFields = serde_json::from_str(raw).ok()?;
        Self::from_parts(&fields.domain, &fields.bus, &fields.device, &fields.function)
    }

    fn from_parts(domain: &str, bus: &str, device: &str, function: &str) -> Option<Self> {
        let addr = Self {
            domain: u16::from_str_radix(strip_hex(domain)?, 16).ok()?,
            bus: u8::from_str_radix(strip_hex(bus)?, 16).ok()?,
            device: u8::from_str_radix(strip_hex(device)?, 16).ok()?,
            function: u8::from_str_radix(strip_hex(function)?, 16).ok()?,
        };
        // 5-bit device, 3-bit function.
        (addr.device <= 0x1f && addr.function <= 0x7).then_some(addr)
    }

    /// The JSON locator string, byte-for-byte as agents have always
    /// stored it: `{"domain": "0000", "bus": "5e", "device": "00", "function": "1"}`.
    pub fn to_locator_json(&self) -> String {
        format!(
            r#"{{"domain": "{:04x}", "bus": "{:02x}", "device": "{:02x}", "function": "{:x}"}}"#,
            self.domain, self.bus, self.device, self.function
        )
    }
}

fn strip_hex(s: &str) -> Option<&str> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    (!s.is_empty()).then_some(s)
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

/// Error returned when a string is not a PCI address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a PCI address: {0}")]
pub struct InvalidPciAddress(pub String);

impl FromStr for PciAddress {
    type Err = InvalidPciAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| InvalidPciAddress(s.to_owned()))
    }
}

/// Canonical identity for a locator string.
///
/// PCI addresses in any accepted spelling render as the JSON locator form;
/// anything else is compared as trimmed text.
pub fn canonical_locator(raw: &str) -> String {
    PciAddress::parse(raw).map_or_else(|| raw.trim().to_owned(), |addr| addr.to_locator_json())
}
