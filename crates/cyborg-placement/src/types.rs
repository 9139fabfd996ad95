// Wire types for the Placement API.
//
// These mirror the JSON bodies exactly. Domain-level inventory and trait
// records live in `cyborg-core`; conversion happens at the HTTP boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Resource providers ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProvider {
    pub uuid: Uuid,
    pub name: String,
    pub generation: u64,
    #[serde(default)]
    pub parent_provider_uuid: Option<Uuid>,
    #[serde(default)]
    pub root_provider_uuid: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceProviderList {
    pub resource_providers: Vec<ResourceProvider>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateProviderRequest {
    pub uuid: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_provider_uuid: Option<Uuid>,
}

// ── Inventories ──────────────────────────────────────────────────────

/// One resource class's inventory on a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub total: u32,
    #[serde(default)]
    pub reserved: u32,
    #[serde(default = "one")]
    pub min_unit: u32,
    #[serde(default = "one")]
    pub max_unit: u32,
    #[serde(default = "one")]
    pub step_size: u32,
    #[serde(default = "one_ratio")]
    pub allocation_ratio: f64,
}

fn one() -> u32 {
    1
}

fn one_ratio() -> f64 {
    1.0
}

/// Body of `GET` and `PUT /resource_providers/{uuid}/inventories`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInventories {
    pub resource_provider_generation: u64,
    #[serde(default)]
    pub inventories: BTreeMap<String, InventoryRecord>,
}

// ── Traits ───────────────────────────────────────────────────────────

/// Body of `GET` and `PUT /resource_providers/{uuid}/traits`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTraits {
    pub resource_provider_generation: u64,
    #[serde(default)]
    pub traits: Vec<String>,
}

// ── Errors ───────────────────────────────────────────────────────────

/// Placement's error envelope: `{"errors": [{status, title, detail, code}]}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    #[serde(default)]
    pub errors: Vec<ErrorItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}
