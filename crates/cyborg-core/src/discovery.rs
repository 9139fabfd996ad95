// ── Discovery ──
//
// Source of the per-pass device tree. Real agents walk sysfs; the bundled
// driver reads a JSON document so passes can be replayed from a file.

use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::model::DriverDevice;

pub trait DiscoveryDriver: Send + Sync {
    fn discover(&self) -> Result<Vec<DriverDevice>, CoreError>;
}

/// Reads a JSON array of devices from a file on every call.
#[derive(Debug, Clone)]
pub struct JsonFileDiscovery {
    path: PathBuf,
}

impl JsonFileDiscovery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DiscoveryDriver for JsonFileDiscovery {
    fn discover(&self) -> Result<Vec<DriverDevice>, CoreError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| CoreError::ValidationFailed {
            message: format!("cannot read device tree {}: {e}", self.path.display()),
        })?;
        parse_device_tree(&raw).map_err(|e| CoreError::ValidationFailed {
            message: format!("invalid device tree {}: {e}", self.path.display()),
        })
    }
}

/// Parse a device tree document.
pub fn parse_device_tree(raw: &str) -> Result<Vec<DriverDevice>, serde_json::Error> {
    serde_json::from_str(raw)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn reads_devices_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"type": "GPU", "vendor": "10de", "controlpath_id": {{"cpid_info": "0000:af:00.0"}}}}]"#
        )
        .unwrap();

        let devices = JsonFileDiscovery::new(file.path()).discover().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].controlpath_id.cpid_type, "PCI");
        assert!(devices[0].deployables.is_empty());
    }

    #[test]
    fn malformed_file_is_a_validation_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        let err = JsonFileDiscovery::new(file.path()).discover().unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed { .. }));
    }
}
