#![cfg(feature = "http_api")]

mod common;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
};
use chrono::{DateTime, Utc};
use common::{INCIDENT_LAT, INCIDENT_LNG, add_unit, provision_types, quick_config};
use dispatch_tool::{
    AssignmentLedger, AssignmentStatus, AvailabilityFilter, DispatchStore, NewAssignment,
    NewResource, NewResourceType, Resource, ResourceAssignment, ResourceId, ResourceQuery,
    ResourceStatus, ResourceStore, ResourceType, StoreError, StoreResult, http_api,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::util::ServiceExt;

async fn fleet_router() -> (axum::Router, Arc<dyn DispatchStore>, Vec<Resource>) {
    let store = common::memory_store();
    provision_types(store.as_ref()).await;
    let units = vec![
        add_unit(store.as_ref(), "AMB-NEAR", "Ambulance", Some(3.0)).await,
        add_unit(store.as_ref(), "AMB-FAR", "Ambulance", Some(22.0)).await,
        add_unit(store.as_ref(), "MED-1", "Medical Team", Some(5.0)).await,
    ];
    let state = http_api::AppState::new(Arc::clone(&store), quick_config());
    (http_api::router(state), store, units)
}

fn json_request(method: &str, uri: &str, payload: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(payload).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let (app, _, _) = fleet_router().await;
    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], json!("ok"));
}

#[tokio::test]
async fn assign_nearest_picks_the_closest_unit() {
    let (app, store, units) = fleet_router().await;
    let payload = json!({
        "latitude": INCIDENT_LAT,
        "longitude": INCIDENT_LNG,
        "conversation_id": "conv-http-1",
        "requirements": [
            { "category": "VEHICLE", "type": "Ambulance", "max_distance_km": 15.0 }
        ]
    });

    let response = app
        .oneshot(json_request("POST", "/resources/assign-nearest", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["assigned_resources"][0]["resource"]["id"], json!(units[0].id));
    let distance = body["total_distance_km"].as_f64().unwrap();
    assert!((distance - 3.0).abs() < 0.01);
    assert_eq!(body["unavailable_requirements"], json!([]));

    let stored = store.get_resource(units[0].id).await.unwrap();
    assert!(stored.is_bound_to("conv-http-1"));
}

#[tokio::test]
async fn assign_nearest_without_matches_is_not_found_with_result() {
    let (app, _, _) = fleet_router().await;
    let payload = json!({
        "latitude": INCIDENT_LAT,
        "longitude": INCIDENT_LNG,
        "conversation_id": "conv-http-2",
        "requirements": [{ "type": "Fire Truck", "count": 2 }]
    });

    let response = app
        .oneshot(json_request("POST", "/resources/assign-nearest", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(
        body["unavailable_requirements"],
        json!(["Fire Truck (2 needed, 0 available)"])
    );
}

#[tokio::test]
async fn out_of_range_coordinates_are_rejected() {
    let (app, _, _) = fleet_router().await;
    let payload = json!({
        "latitude": 123.0,
        "longitude": INCIDENT_LNG,
        "conversation_id": "conv-http-3"
    });
    let response = app
        .oneshot(json_request("POST", "/resources/assign-nearest", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["error"], json!("invalid_request"));
}

#[tokio::test]
async fn direct_assignment_conflicts_on_second_claim() {
    let (app, _, units) = fleet_router().await;
    let payload = json!({ "resource_id": units[1].id, "conversation_id": "conv-http-4" });

    let response = app
        .clone()
        .oneshot(json_request("POST", "/resources/assign", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let payload = json!({ "resource_id": units[1].id, "conversation_id": "conv-http-5" });
    let response = app
        .oneshot(json_request("POST", "/resources/assign", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(read_json(response).await["error"], json!("conflict"));
}

#[tokio::test]
async fn assign_by_type_then_release_by_incident() {
    let (app, store, _) = fleet_router().await;
    let payload = json!({
        "resource_type": "ambulance",
        "count": 3,
        "conversation_id": "conv-http-6",
        "note": "pile-up"
    });
    let response = app
        .clone()
        .oneshot(json_request("POST", "/resources/assign-by-type", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["requested"], json!(3));
    assert_eq!(body["assigned_resources"].as_array().unwrap().len(), 2);

    let response = app
        .oneshot(json_request(
            "POST",
            "/incidents/conv-http-6/release",
            &json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["released"].as_array().unwrap().len(), 2);
    assert_eq!(body["completed_assignments"], json!(2));
    assert!(store.bound_to("conv-http-6").await.unwrap().is_empty());
}

#[tokio::test]
async fn release_endpoint_reports_failures() {
    let (app, _, units) = fleet_router().await;
    let payload = json!({ "resource_id": units[2].id, "conversation_id": "conv-http-7" });
    app.clone()
        .oneshot(json_request("POST", "/resources/assign", &payload))
        .await
        .unwrap();

    let payload = json!({ "conversation_id": "conv-http-7", "resource_ids": [units[2].id, 404] });
    let response = app
        .clone()
        .oneshot(json_request("POST", "/resources/release", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["released"], json!([units[2].id]));
    assert_eq!(body["failures"][0]["resource_id"], json!(404));

    let response = app
        .oneshot(get(&format!("/resources/{}/assignments", units[2].id)))
        .await
        .unwrap();
    let history = read_json(response).await;
    assert_eq!(history[0]["status"], json!("COMPLETED"));
}

#[tokio::test]
async fn resource_listing_and_lookup() {
    let (app, _, units) = fleet_router().await;

    let response = app
        .clone()
        .oneshot(get("/resources?category=vehicle"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await.as_array().unwrap().len(), 2);

    let response = app
        .clone()
        .oneshot(get("/resources?category=spaceship"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(get(&format!("/resources/{}", units[0].id)))
        .await
        .unwrap();
    assert_eq!(read_json(response).await["identifier"], json!("AMB-NEAR"));

    let response = app.oneshot(get("/resources/999")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json(response).await["error"], json!("not_found"));
}

#[tokio::test]
async fn status_updates_feed_stats() {
    let (app, _, units) = fleet_router().await;

    let uri = format!("/resources/{}/status", units[1].id);
    let response = app
        .clone()
        .oneshot(json_request("PUT", &uri, &json!({ "status": "maintenance" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["status"], json!("MAINTENANCE"));

    let response = app
        .clone()
        .oneshot(json_request("PUT", &uri, &json!({ "status": "ASSIGNED" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(get("/resources?available=true"))
        .await
        .unwrap();
    assert_eq!(read_json(response).await.as_array().unwrap().len(), 2);

    let response = app.oneshot(get("/stats")).await.unwrap();
    let stats = read_json(response).await;
    assert_eq!(stats["total"], json!(3));
    assert_eq!(stats["maintenance"], json!(1));
    assert_eq!(stats["by_category"]["VEHICLE"]["total"], json!(2));
    assert_eq!(stats["utilization_percent"], json!(0.0));
}

/// Store whose every call fails as if the database were unreachable.
struct OfflineStore;

fn offline<T>() -> StoreResult<T> {
    Err(StoreError::Unavailable("database offline".into()))
}

#[async_trait]
impl ResourceStore for OfflineStore {
    async fn insert_resource_type(&self, _: NewResourceType) -> StoreResult<ResourceType> {
        offline()
    }
    async fn insert_resource(&self, _: NewResource) -> StoreResult<Resource> {
        offline()
    }
    async fn resource_types(&self) -> StoreResult<Vec<ResourceType>> {
        offline()
    }
    async fn get_resource(&self, _: ResourceId) -> StoreResult<Resource> {
        offline()
    }
    async fn list_resources(&self, _: &ResourceQuery) -> StoreResult<Vec<Resource>> {
        offline()
    }
    async fn list_available(&self, _: &AvailabilityFilter) -> StoreResult<Vec<Resource>> {
        offline()
    }
    async fn bound_to(&self, _: &str) -> StoreResult<Vec<Resource>> {
        offline()
    }
    async fn commit(&self, _: ResourceId, _: &str, _: DateTime<Utc>) -> StoreResult<Resource> {
        offline()
    }
    async fn release(&self, _: ResourceId) -> StoreResult<Resource> {
        offline()
    }
    async fn release_from(&self, _: ResourceId, _: &str) -> StoreResult<Resource> {
        offline()
    }
    async fn mark_in_use(&self, _: ResourceId, _: &str) -> StoreResult<Resource> {
        offline()
    }
    async fn set_status(&self, _: ResourceId, _: ResourceStatus) -> StoreResult<Resource> {
        offline()
    }
}

#[async_trait]
impl AssignmentLedger for OfflineStore {
    async fn record_assignment(&self, _: NewAssignment) -> StoreResult<ResourceAssignment> {
        offline()
    }
    async fn close_assignments(
        &self,
        _: ResourceId,
        _: Option<&str>,
        _: AssignmentStatus,
        _: DateTime<Utc>,
    ) -> StoreResult<usize> {
        offline()
    }
    async fn mark_deployed(&self, _: ResourceId, _: &str) -> StoreResult<usize> {
        offline()
    }
    async fn assignments_for_resource(&self, _: ResourceId) -> StoreResult<Vec<ResourceAssignment>> {
        offline()
    }
    async fn assignments_for_incident(&self, _: &str) -> StoreResult<Vec<ResourceAssignment>> {
        offline()
    }
}

#[tokio::test]
async fn store_outage_maps_to_service_unavailable() {
    let state = http_api::AppState::new(Arc::new(OfflineStore), quick_config());
    let app = http_api::router(state);
    let payload = json!({
        "latitude": INCIDENT_LAT,
        "longitude": INCIDENT_LNG,
        "conversation_id": "conv-http-8"
    });

    let response = app
        .clone()
        .oneshot(json_request("POST", "/resources/assign-nearest", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = read_json(response).await;
    assert_eq!(body["error"], json!("store_unavailable"));
    assert_eq!(body["partial"]["assigned_resources"], json!([]));

    let response = app.oneshot(get("/stats")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
