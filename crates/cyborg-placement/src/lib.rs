// cyborg-placement: Async Rust client for the OpenStack Placement API

pub mod client;
pub mod error;
pub mod transport;
pub mod types;

pub use client::{API_VERSION_HEADER, CONCURRENT_UPDATE_CODE, PlacementClient};
pub use error::Error;
pub use transport::{DEFAULT_MICROVERSION, TlsMode, TransportConfig};
pub use types::{
    CreateProviderRequest, InventoryRecord, ProviderInventories, ProviderTraits, ResourceProvider,
};
