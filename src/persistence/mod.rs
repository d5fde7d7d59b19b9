use crate::assignment::{AssignmentStatus, NewAssignment, ResourceAssignment};
use crate::catalog::{
    NewResource, NewResourceType, Resource, ResourceCategory, ResourceId, ResourceStatus,
    ResourceType,
};
use crate::distance::Coordinates;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Selection over AVAILABLE resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ResourceCategory>,
    /// ASCII case-insensitive substring of the type name or the resource name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name_contains: Option<String>,
    #[serde(default)]
    pub has_coordinates: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl AvailabilityFilter {
    pub fn matches(&self, resource: &Resource) -> bool {
        if !resource.is_available() {
            return false;
        }
        if let Some(category) = self.category {
            if resource.category() != category {
                return false;
            }
        }
        if let Some(hint) = self.type_name_contains.as_deref() {
            if !resource.matches_type_hint(hint) {
                return false;
            }
        }
        !self.has_coordinates || resource.coordinates().is_some()
    }
}

/// Listing over every resource regardless of availability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ResourceCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResourceStatus>,
}

impl ResourceQuery {
    pub fn matches(&self, resource: &Resource) -> bool {
        self.category.is_none_or(|c| resource.category() == c)
            && self.status.is_none_or(|s| resource.status == s)
    }
}

/// Persisted, mutable state of every resource instance.
///
/// `commit` is the only place contention is resolved: implementations must
/// check AVAILABLE and bind the incident in one atomic step.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn insert_resource_type(&self, new: NewResourceType) -> StoreResult<ResourceType>;
    async fn insert_resource(&self, new: NewResource) -> StoreResult<Resource>;
    async fn resource_types(&self) -> StoreResult<Vec<ResourceType>>;

    async fn get_resource(&self, id: ResourceId) -> StoreResult<Resource>;
    /// All resources matching `query`, oldest first.
    async fn list_resources(&self, query: &ResourceQuery) -> StoreResult<Vec<Resource>>;
    /// AVAILABLE resources matching `filter`, oldest first, capped by `filter.limit`.
    async fn list_available(&self, filter: &AvailabilityFilter) -> StoreResult<Vec<Resource>>;
    /// Resources whose binding names `incident_id`, oldest first.
    async fn bound_to(&self, incident_id: &str) -> StoreResult<Vec<Resource>>;

    /// AVAILABLE -> ASSIGNED, bound to `incident_id`. `Conflict` when the
    /// resource is in any other status.
    async fn commit(
        &self,
        id: ResourceId,
        incident_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Resource>;
    /// Clears any binding. Releasing an unbound resource is a no-op.
    async fn release(&self, id: ResourceId) -> StoreResult<Resource>;
    /// Clears the binding only when it names `incident_id`; `NotFound` otherwise.
    async fn release_from(&self, id: ResourceId, incident_id: &str) -> StoreResult<Resource>;
    /// ASSIGNED -> IN_USE for a resource bound to `incident_id`.
    async fn mark_in_use(&self, id: ResourceId, incident_id: &str) -> StoreResult<Resource>;
    /// Administrative status change for unbound resources.
    async fn set_status(&self, id: ResourceId, status: ResourceStatus) -> StoreResult<Resource>;
}

/// Audit trail of commitments, kept separately from current resource state.
#[async_trait]
pub trait AssignmentLedger: Send + Sync {
    async fn record_assignment(&self, new: NewAssignment) -> StoreResult<ResourceAssignment>;
    /// Moves open entries for `resource_id` (optionally only those for
    /// `incident_id`) to `status`, stamping `completed_at` for terminal ones.
    /// Returns the number of entries touched.
    async fn close_assignments(
        &self,
        resource_id: ResourceId,
        incident_id: Option<&str>,
        status: AssignmentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<usize>;
    /// Moves ASSIGNED entries for the pair to DEPLOYED.
    async fn mark_deployed(&self, resource_id: ResourceId, incident_id: &str)
    -> StoreResult<usize>;
    async fn assignments_for_resource(
        &self,
        resource_id: ResourceId,
    ) -> StoreResult<Vec<ResourceAssignment>>;
    async fn assignments_for_incident(
        &self,
        incident_id: &str,
    ) -> StoreResult<Vec<ResourceAssignment>>;
}

/// Object-safe umbrella over both halves of the persistence collaborator.
pub trait DispatchStore: ResourceStore + AssignmentLedger {}

impl<T: ResourceStore + AssignmentLedger + ?Sized> DispatchStore for T {}

/// Coordinates on a new resource must come in pairs and lie on the globe.
pub(crate) fn check_position(new: &NewResource) -> StoreResult<()> {
    match (new.latitude, new.longitude) {
        (Some(latitude), Some(longitude)) => Coordinates::new(latitude, longitude)
            .map(|_| ())
            .map_err(|err| {
                StoreError::InvalidData(format!("resource '{}': {err}", new.identifier))
            }),
        (None, None) => Ok(()),
        _ => Err(StoreError::InvalidData(format!(
            "resource '{}' must set both latitude and longitude or neither",
            new.identifier
        ))),
    }
}

/// SQLite when a path is given, a fresh in-memory store otherwise.
pub fn open_store(database_path: Option<&Path>) -> StoreResult<Arc<dyn DispatchStore>> {
    match database_path {
        #[cfg(feature = "sqlite")]
        Some(path) => Ok(Arc::new(sqlite::SqliteResourceStore::new(path)?)),
        #[cfg(not(feature = "sqlite"))]
        Some(path) => Err(StoreError::InvalidData(format!(
            "{} needs the sqlite feature",
            path.display()
        ))),
        None => Ok(Arc::new(InMemoryResourceStore::new())),
    }
}

pub mod file;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file::{
    CatalogSnapshot, SeedSummary, default_catalog, load_catalog_from_csv, load_catalog_from_json,
    save_catalog_to_csv, save_catalog_to_json, seed_catalog,
};
pub use memory::InMemoryResourceStore;
