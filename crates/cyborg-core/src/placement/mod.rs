// ── Placement reconciliation ──
//
// Provider naming, the cached provider tree, the report client that flushes
// it, and the propagation layer that converges a host's providers on its
// discovered devices.

pub mod naming;
pub mod propagate;
pub mod report;
pub mod tree;

pub use naming::{
    deployable_provider_name, device_provider_name, is_device_provider_name, provider_uuid,
};
pub use propagate::{PlacementReporter, PropagationOutcome, accelerator_inventory};
pub use report::{FlushCounts, ReportClient};
pub use tree::{Inventory, ProviderData, ProviderTree};
