// ── Provider identity ──
//
// Provider UUIDs are derived from names so every conductor computes the
// same UUID for the same hardware, and so existing deployments keep their
// providers: uuid3 in the DNS namespace, non-word characters mapped to `_`.

use uuid::Uuid;

use crate::model::{DeviceType, canonical_locator};

/// Deterministic provider UUID for a provider name.
pub fn provider_uuid(name: &str) -> Uuid {
    Uuid::new_v3(&Uuid::NAMESPACE_DNS, name.as_bytes())
}

/// `{TYPE}_{locator}` with every non-word character of the canonical
/// locator replaced by `_`.
pub fn device_provider_name(device_type: DeviceType, cpid_info: &str) -> String {
    let locator: String = canonical_locator(cpid_info)
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    format!("{device_type}_{locator}")
}

/// Whether `name` has the shape [`device_provider_name`] produces: a
/// device type, then the sanitised locator object.
pub fn is_device_provider_name(name: &str) -> bool {
    name.split_once('_').is_some_and(|(prefix, locator)| {
        locator.starts_with("__") && prefix.parse::<DeviceType>().is_ok()
    })
}

/// Deployable providers are named after the deployable itself.
pub fn deployable_provider_name(deployable_name: &str) -> String {
    deployable_name.to_owned()
}
