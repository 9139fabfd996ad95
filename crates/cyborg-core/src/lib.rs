// cyborg-core: accelerator inventory reconciliation
//
// Diffs discovered device trees against persisted state, applies the
// result to the inventory store, and propagates it to Placement.

pub mod apply;
pub mod conductor;
pub mod config;
pub mod diff;
pub mod discovery;
pub mod error;
pub mod model;
pub mod placement;
pub mod plan;
pub mod store;

#[cfg(test)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use apply::{ApplyOutcome, apply_store_ops};
pub use conductor::{Conductor, ReconcileSummary};
pub use config::{ConductorConfig, TlsVerification};
pub use diff::{DiffError, Layer, LayerDiff, diff_layer};
pub use discovery::{DiscoveryDriver, JsonFileDiscovery, parse_device_tree};
pub use error::CoreError;
pub use placement::{
    FlushCounts, Inventory, PlacementReporter, PropagationOutcome, ProviderData, ProviderTree,
    ReportClient, deployable_provider_name, device_provider_name, provider_uuid,
};
pub use plan::{DiffStats, LayerCounts, OpKind, PlacementOp, ReconcilePlan, StoreOp};
pub use store::{
    HostInventory, InventoryStore, MemoryStore, StoreSnapshot, load_host_inventory, load_host_tree,
};

// Wire types surfaced through the report client.
pub use cyborg_placement::{InventoryRecord, ResourceProvider};

// ── Model re-exports ────────────────────────────────────────────────
pub use model::{
    DeviceFields, DeviceType, DriverAttachHandle, DriverAttribute, DriverControlpathId,
    DriverDeployable, DriverDevice, OrphanedDevice, PciAddress, StoredDevice,
};
