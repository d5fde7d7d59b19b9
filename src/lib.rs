pub mod allocation;
pub mod assignment;
pub mod catalog;
pub mod config;
pub mod distance;
pub mod error;
#[cfg(feature = "http_api")]
pub mod http_api;
pub mod persistence;
pub mod release;
pub mod stats;

pub use allocation::{
    AllocationConfig, AllocationEngine, AllocationResult, AssignedResource, Incident,
    ResourceRequirement, default_requirements,
};
pub use assignment::{AssignmentStatus, NewAssignment, ResourceAssignment};
pub use catalog::{
    NewResource, NewResourceType, Resource, ResourceCategory, ResourceId, ResourceStatus,
    ResourceType,
};
pub use config::DispatchConfig;
pub use distance::{CoordinateError, Coordinates, distance_km};
pub use error::{AllocationError, ConfigError, ReleaseError, StoreError, StoreResult};
#[cfg(feature = "sqlite")]
pub use persistence::sqlite::SqliteResourceStore;
pub use persistence::{
    AssignmentLedger, AvailabilityFilter, CatalogSnapshot, DispatchStore, InMemoryResourceStore,
    ResourceQuery, ResourceStore, SeedSummary, default_catalog, load_catalog_from_csv,
    load_catalog_from_json, open_store, save_catalog_to_csv, save_catalog_to_json, seed_catalog,
};
pub use release::{ReleaseCoordinator, ReleaseFailure, ReleaseSummary};
pub use stats::{CategoryStats, ResourceStats};
