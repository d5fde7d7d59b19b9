#![allow(dead_code)]

use dispatch_tool::{
    AllocationConfig, DispatchStore, InMemoryResourceStore, NewResource, NewResourceType, Resource,
    ResourceCategory, ResourceStore,
};
use std::sync::Arc;
use std::time::Duration;

pub const INCIDENT_LAT: f64 = 22.253;
pub const INCIDENT_LNG: f64 = 84.908;

/// Kilometres per degree of latitude on the Haversine sphere.
pub const KM_PER_DEGREE_LAT: f64 = 111.194_926_644_558_73;

pub fn quick_config() -> AllocationConfig {
    AllocationConfig {
        commit_delay: Duration::ZERO,
        ..AllocationConfig::default()
    }
}

pub fn memory_store() -> Arc<dyn DispatchStore> {
    Arc::new(InMemoryResourceStore::new())
}

#[cfg(feature = "sqlite")]
pub fn sqlite_store() -> Arc<dyn DispatchStore> {
    Arc::new(dispatch_tool::SqliteResourceStore::in_memory().unwrap())
}

pub fn all_backends() -> Vec<(&'static str, Arc<dyn DispatchStore>)> {
    let mut backends = vec![("memory", memory_store())];
    #[cfg(feature = "sqlite")]
    backends.push(("sqlite", sqlite_store()));
    backends
}

pub async fn provision_types(store: &dyn DispatchStore) {
    for (name, category) in [
        ("Ambulance", ResourceCategory::Vehicle),
        ("Fire Truck", ResourceCategory::Vehicle),
        ("Medical Team", ResourceCategory::Personnel),
        ("Medical Kit", ResourceCategory::Equipment),
    ] {
        store
            .insert_resource_type(NewResourceType::new(name, category, ""))
            .await
            .unwrap();
    }
}

/// Adds a unit placed `km_north` due north of the incident, or without
/// coordinates when `None`.
pub async fn add_unit(
    store: &dyn DispatchStore,
    identifier: &str,
    type_name: &str,
    km_north: Option<f64>,
) -> Resource {
    let mut unit = NewResource::new(identifier, format!("{type_name} {identifier}"), type_name);
    if let Some(km) = km_north {
        unit = unit.at(INCIDENT_LAT + km / KM_PER_DEGREE_LAT, INCIDENT_LNG);
    }
    store.insert_resource(unit).await.unwrap()
}
