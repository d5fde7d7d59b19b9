use super::{ResourceQuery, ResourceStore, check_position};
use crate::catalog::{NewResource, NewResourceType, ResourceCategory};
use crate::error::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

/// Provisioning data: resource types plus the units that belong to them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub resource_types: Vec<NewResourceType>,
    pub resources: Vec<NewResource>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedSummary {
    pub types_created: usize,
    pub resources_created: usize,
    pub skipped: usize,
}

impl CatalogSnapshot {
    /// Captures the current catalog. Live status and bindings are not part
    /// of a snapshot.
    pub async fn from_store<S>(store: &S) -> StoreResult<Self>
    where
        S: ResourceStore + ?Sized,
    {
        let resource_types = store
            .resource_types()
            .await?
            .into_iter()
            .map(|t| NewResourceType::new(t.name, t.category, t.description))
            .collect();
        let resources = store
            .list_resources(&ResourceQuery::default())
            .await?
            .into_iter()
            .map(|r| NewResource {
                identifier: r.identifier,
                name: r.name,
                type_name: r.resource_type.name,
                capacity: r.capacity,
                location: r.location,
                latitude: r.latitude,
                longitude: r.longitude,
            })
            .collect();
        Ok(Self {
            resource_types,
            resources,
        })
    }

    pub fn validate(&self) -> StoreResult<()> {
        let mut type_names = HashSet::with_capacity(self.resource_types.len());
        for resource_type in &self.resource_types {
            if resource_type.name.trim().is_empty() {
                return Err(StoreError::InvalidData(
                    "resource type requires a non-empty name".into(),
                ));
            }
            if !type_names.insert(resource_type.name.as_str()) {
                return Err(StoreError::InvalidData(format!(
                    "duplicate resource type '{}'",
                    resource_type.name
                )));
            }
        }

        let mut identifiers = HashSet::with_capacity(self.resources.len());
        for resource in &self.resources {
            if resource.identifier.trim().is_empty() {
                return Err(StoreError::InvalidData(format!(
                    "resource '{}' requires a non-empty identifier",
                    resource.name
                )));
            }
            if !identifiers.insert(resource.identifier.as_str()) {
                return Err(StoreError::InvalidData(format!(
                    "duplicate resource identifier '{}'",
                    resource.identifier
                )));
            }
            if !type_names.contains(resource.type_name.as_str()) {
                return Err(StoreError::InvalidData(format!(
                    "resource '{}' references unknown type '{}'",
                    resource.identifier, resource.type_name
                )));
            }
            if resource.capacity < 0 {
                return Err(StoreError::InvalidData(format!(
                    "resource '{}' has negative capacity {}",
                    resource.identifier, resource.capacity
                )));
            }
            check_position(resource)?;
        }
        Ok(())
    }
}

/// Provisions a snapshot into `store`. Entries that already exist are
/// skipped, so seeding twice is harmless.
pub async fn seed_catalog<S>(store: &S, snapshot: &CatalogSnapshot) -> StoreResult<SeedSummary>
where
    S: ResourceStore + ?Sized,
{
    snapshot.validate()?;
    let mut summary = SeedSummary::default();
    for resource_type in &snapshot.resource_types {
        match store.insert_resource_type(resource_type.clone()).await {
            Ok(_) => summary.types_created += 1,
            Err(StoreError::AlreadyExists { key, .. }) => {
                debug!(resource_type = %key, "resource type already seeded");
                summary.skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }
    for resource in &snapshot.resources {
        match store.insert_resource(resource.clone()).await {
            Ok(_) => summary.resources_created += 1,
            Err(StoreError::AlreadyExists { key, .. }) => {
                debug!(identifier = %key, "resource already seeded");
                summary.skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }
    info!(
        types = summary.types_created,
        resources = summary.resources_created,
        skipped = summary.skipped,
        "catalog seeded"
    );
    Ok(summary)
}

pub fn save_catalog_to_json<P: AsRef<Path>>(
    snapshot: &CatalogSnapshot,
    path: P,
) -> StoreResult<()> {
    snapshot.validate()?;
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, snapshot)?;
    Ok(())
}

pub fn load_catalog_from_json<P: AsRef<Path>>(path: P) -> StoreResult<CatalogSnapshot> {
    let file = File::open(path)?;
    let snapshot: CatalogSnapshot = serde_json::from_reader(file)?;
    snapshot.validate()?;
    Ok(snapshot)
}

#[derive(Default, Serialize, Deserialize)]
struct ResourceCsvRecord {
    identifier: String,
    name: String,
    type_name: String,
    category: String,
    #[serde(default)]
    type_description: String,
    capacity: i64,
    #[serde(default)]
    location: String,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
}

/// One row per resource; type rows are reconstructed from the first row
/// naming each type.
pub fn save_catalog_to_csv<P: AsRef<Path>>(snapshot: &CatalogSnapshot, path: P) -> StoreResult<()> {
    snapshot.validate()?;
    let types: HashMap<&str, &NewResourceType> = snapshot
        .resource_types
        .iter()
        .map(|t| (t.name.as_str(), t))
        .collect();
    let mut writer = csv::Writer::from_path(path)?;
    for resource in &snapshot.resources {
        let Some(resource_type) = types.get(resource.type_name.as_str()) else {
            continue;
        };
        writer.serialize(ResourceCsvRecord {
            identifier: resource.identifier.clone(),
            name: resource.name.clone(),
            type_name: resource.type_name.clone(),
            category: resource_type.category.as_str().to_string(),
            type_description: resource_type.description.clone(),
            capacity: resource.capacity,
            location: resource.location.clone(),
            latitude: resource.latitude,
            longitude: resource.longitude,
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn load_catalog_from_csv<P: AsRef<Path>>(path: P) -> StoreResult<CatalogSnapshot> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut snapshot = CatalogSnapshot::default();
    let mut categories: HashMap<String, ResourceCategory> = HashMap::new();
    for record in reader.deserialize::<ResourceCsvRecord>() {
        let record = record?;
        let category: ResourceCategory = record
            .category
            .parse()
            .map_err(|err| StoreError::InvalidData(format!("{err}")))?;
        match categories.get(&record.type_name) {
            Some(existing) if *existing != category => {
                return Err(StoreError::InvalidData(format!(
                    "type '{}' listed under both {existing} and {category}",
                    record.type_name
                )));
            }
            Some(_) => {}
            None => {
                categories.insert(record.type_name.clone(), category);
                snapshot.resource_types.push(NewResourceType::new(
                    record.type_name.clone(),
                    category,
                    record.type_description,
                ));
            }
        }
        snapshot.resources.push(NewResource {
            identifier: record.identifier,
            name: record.name,
            type_name: record.type_name,
            capacity: record.capacity,
            location: record.location,
            latitude: record.latitude,
            longitude: record.longitude,
        });
    }
    snapshot.validate()?;
    Ok(snapshot)
}

/// Built-in provisioning set: twelve types and forty units staged
/// around (22.253, 84.908).
pub fn default_catalog() -> CatalogSnapshot {
    use ResourceCategory::*;

    let types = [
        ("Emergency Medical Technician", Personnel, "Certified EMT for medical emergencies"),
        ("Rescue Specialist", Personnel, "Trained rescue operations specialist"),
        ("Disaster Coordinator", Personnel, "Emergency response coordinator"),
        ("Ambulance", Vehicle, "Emergency medical transport vehicle"),
        ("Fire Truck", Vehicle, "Fire and rescue vehicle"),
        ("Search & Rescue Vehicle", Vehicle, "All-terrain rescue vehicle"),
        ("Medical Kit", Equipment, "Portable emergency medical supplies"),
        ("Rescue Equipment", Equipment, "Ropes, tools, and rescue gear"),
        ("Emergency Food Package", Supply, "Ready-to-eat emergency food for 10 people"),
        ("Water Purification Kit", Supply, "Portable water treatment system"),
        ("Emergency Shelter", Facility, "Temporary shelter facility"),
        ("Medical Station", Facility, "Mobile medical treatment facility"),
    ];

    // (identifier, type index, capacity, location, latitude, longitude)
    let units: [(&str, usize, i64, &str, f64, f64); 35] = [
        ("EMT-001", 0, 1, "Station 1", 22.270, 84.900),
        ("EMT-002", 0, 1, "Station 2", 22.250, 84.920),
        ("EMT-003", 0, 1, "Station 3", 22.260, 84.910),
        ("RESCUE-01", 1, 1, "Rescue Station 1", 22.280, 84.890),
        ("RESCUE-02", 1, 1, "Rescue Station 2", 22.240, 84.930),
        ("COORD-01", 2, 1, "Command Center 1", 22.260, 84.910),
        ("COORD-02", 2, 1, "Command Center 2", 22.255, 84.915),
        ("AMB-001", 3, 4, "Medical Station 1", 22.270, 84.900),
        ("AMB-002", 3, 4, "Medical Station 2", 22.250, 84.920),
        ("FIRE-001", 4, 6, "Fire Station Alpha", 22.260, 84.910),
        ("SAR-001", 5, 4, "SAR Base 1", 22.290, 84.880),
        ("SAR-002", 5, 4, "SAR Base 2", 22.230, 84.930),
        ("MEDKIT-001", 6, 10, "Medical Storage 1", 22.280, 84.910),
        ("MEDKIT-002", 6, 10, "Medical Storage 1", 22.280, 84.910),
        ("MEDKIT-003", 6, 10, "Medical Storage 1", 22.280, 84.910),
        ("MEDKIT-004", 6, 10, "Medical Storage 2", 22.240, 84.910),
        ("MEDKIT-005", 6, 10, "Medical Storage 2", 22.240, 84.910),
        ("RESCUE-KIT-01", 7, 1, "Equipment Storage 1", 22.260, 84.920),
        ("RESCUE-KIT-02", 7, 1, "Equipment Storage 2", 22.260, 84.900),
        ("RESCUE-KIT-03", 7, 1, "Equipment Storage 3", 22.260, 84.910),
        ("FOOD-001", 8, 10, "Supply Depot 1", 22.250, 84.890),
        ("FOOD-002", 8, 10, "Supply Depot 1", 22.250, 84.890),
        ("FOOD-003", 8, 10, "Supply Depot 1", 22.250, 84.890),
        ("FOOD-004", 8, 10, "Supply Depot 1", 22.250, 84.890),
        ("FOOD-005", 8, 10, "Supply Depot 1", 22.275, 84.920),
        ("FOOD-006", 8, 10, "Supply Depot 2", 22.275, 84.920),
        ("FOOD-007", 8, 10, "Supply Depot 2", 22.275, 84.920),
        ("FOOD-008", 8, 10, "Supply Depot 2", 22.275, 84.920),
        ("FOOD-009", 8, 10, "Supply Depot 2", 22.260, 84.880),
        ("FOOD-010", 8, 10, "Supply Depot 2", 22.260, 84.880),
        ("WATER-001", 9, 100, "Water Station 1", 22.285, 84.905),
        ("WATER-002", 9, 100, "Water Station 2", 22.235, 84.915),
        ("WATER-003", 9, 100, "Water Station 3", 22.265, 84.935),
        ("WATER-004", 9, 100, "Water Station 4", 22.245, 84.885),
        ("WATER-005", 9, 100, "Water Station 5", 22.270, 84.895),
    ];

    let mut snapshot = CatalogSnapshot {
        resource_types: types
            .iter()
            .map(|(name, category, description)| {
                NewResourceType::new(*name, *category, *description)
            })
            .collect(),
        resources: units
            .iter()
            .map(|(identifier, type_idx, capacity, location, lat, lng)| {
                NewResource::new(*identifier, *identifier, types[*type_idx].0)
                    .with_capacity(*capacity)
                    .located(*location)
                    .at(*lat, *lng)
            })
            .collect(),
    };

    let facilities = [
        ("SHELTER-01", 10, 50, "Shelter Site 1", 22.270, 84.900),
        ("SHELTER-02", 10, 50, "Shelter Site 2", 22.240, 84.920),
        ("SHELTER-03", 10, 50, "Shelter Site 3", 22.280, 84.930),
        ("MEDSTATION-01", 11, 20, "Medical Facility 1", 22.275, 84.910),
        ("MEDSTATION-02", 11, 20, "Medical Facility 2", 22.245, 84.910),
    ];
    snapshot.resources.extend(facilities.iter().map(
        |(identifier, type_idx, capacity, location, lat, lng)| {
            NewResource::new(*identifier, *identifier, types[*type_idx].0)
                .with_capacity(*capacity)
                .located(*location)
                .at(*lat, *lng)
        },
    ));
    snapshot
}
