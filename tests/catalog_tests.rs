mod common;

use dispatch_tool::{
    CatalogSnapshot, InMemoryResourceStore, NewResource, NewResourceType, ResourceCategory,
    ResourceQuery, ResourceStore, StoreError, default_catalog, load_catalog_from_csv,
    load_catalog_from_json, save_catalog_to_csv, save_catalog_to_json, seed_catalog,
};
use std::fs;
use tempfile::tempdir;

#[tokio::test]
async fn json_snapshot_round_trips_through_every_backend() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("catalog.json");
    save_catalog_to_json(&default_catalog(), &path).unwrap();

    let loaded = load_catalog_from_json(&path).unwrap();
    let identifiers: Vec<&str> = loaded.resources.iter().map(|r| r.identifier.as_str()).collect();
    let catalog = default_catalog();
    let expected: Vec<&str> = catalog.resources.iter().map(|r| r.identifier.as_str()).collect();
    assert_eq!(identifiers, expected);

    for (backend, store) in common::all_backends() {
        seed_catalog(store.as_ref(), &loaded).await.unwrap();
        let exported = CatalogSnapshot::from_store(store.as_ref()).await.unwrap();
        assert_eq!(exported.resource_types.len(), 12, "{backend}");
        assert_eq!(exported.resources.len(), 40, "{backend}");
        assert_eq!(exported.resources[0], loaded.resources[0], "{backend}");
    }
}

#[tokio::test]
async fn csv_export_rebuilds_types_from_rows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("catalog.csv");
    save_catalog_to_csv(&default_catalog(), &path).unwrap();

    let raw = fs::read_to_string(&path).unwrap();
    let header = raw.lines().next().unwrap();
    assert!(header.starts_with("identifier,name,type_name,category"));

    let loaded = load_catalog_from_csv(&path).unwrap();
    assert_eq!(loaded.resources.len(), 40);
    assert_eq!(loaded.resource_types.len(), 12);
    let ambulance = loaded
        .resource_types
        .iter()
        .find(|t| t.name == "Ambulance")
        .unwrap();
    assert_eq!(ambulance.category, ResourceCategory::Vehicle);

    let store = InMemoryResourceStore::new();
    seed_catalog(&store, &loaded).await.unwrap();
    let vehicles = store
        .list_resources(&ResourceQuery {
            category: Some(ResourceCategory::Vehicle),
            ..ResourceQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(vehicles.len(), 5);
}

#[test]
fn csv_rows_without_coordinates_load_as_unlocated() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("partial.csv");
    fs::write(
        &path,
        "identifier,name,type_name,category,type_description,capacity,location,latitude,longitude\n\
         KIT-1,Field kit,Medical Kit,EQUIPMENT,,5,Depot,,\n\
         AMB-1,Unit one,Ambulance,vehicle,,4,Bay 2,22.25,84.9\n",
    )
    .unwrap();

    let loaded = load_catalog_from_csv(&path).unwrap();
    assert_eq!(loaded.resources[0].latitude, None);
    assert_eq!(loaded.resources[1].latitude, Some(22.25));
    assert_eq!(loaded.resource_types[1].category, ResourceCategory::Vehicle);
}

#[test]
fn conflicting_categories_for_one_type_are_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.csv");
    fs::write(
        &path,
        "identifier,name,type_name,category,type_description,capacity,location,latitude,longitude\n\
         A-1,A,Ambulance,VEHICLE,,1,,,\n\
         A-2,B,Ambulance,EQUIPMENT,,1,,,\n",
    )
    .unwrap();

    assert!(matches!(
        load_catalog_from_csv(&path),
        Err(StoreError::InvalidData(_))
    ));
}

#[test]
fn half_specified_coordinates_fail_validation() {
    let snapshot = CatalogSnapshot {
        resource_types: vec![NewResourceType::new("Ambulance", ResourceCategory::Vehicle, "")],
        resources: vec![NewResource {
            latitude: Some(22.0),
            ..NewResource::new("AMB-1", "AMB-1", "Ambulance")
        }],
    };
    let dir = tempdir().unwrap();
    let err = save_catalog_to_json(&snapshot, dir.path().join("x.json")).unwrap_err();
    assert!(matches!(err, StoreError::InvalidData(_)));
}
