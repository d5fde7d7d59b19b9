use std::{net::SocketAddr, str::FromStr, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    AllocationConfig, AllocationEngine, AllocationError, AllocationResult, AssignedResource,
    AssignmentLedger, Coordinates, DispatchStore, ReleaseCoordinator, ReleaseError, ReleaseSummary, Resource,
    ResourceAssignment, ResourceCategory, ResourceId, ResourceQuery, ResourceRequirement,
    ResourceStats, ResourceStatus, ResourceStore, StoreError,
};

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn DispatchStore>,
    engine: AllocationEngine<dyn DispatchStore>,
    releases: ReleaseCoordinator<dyn DispatchStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn DispatchStore>, config: AllocationConfig) -> Self {
        Self {
            engine: AllocationEngine::with_config(Arc::clone(&store), config),
            releases: ReleaseCoordinator::new(Arc::clone(&store)),
            store,
        }
    }

    fn store(&self) -> &dyn DispatchStore {
        self.store.as_ref()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    partial: Option<serde_json::Value>,
}

#[derive(Debug)]
enum ApiError {
    NotFound(String),
    Conflict(String),
    Invalid(String),
    Unavailable {
        message: String,
        partial: Option<serde_json::Value>,
    },
    Internal(String),
}

impl ApiError {
    fn invalid(message: impl Into<String>) -> Self {
        ApiError::Invalid(message.into())
    }

    fn unavailable<T: Serialize>(message: String, partial: &T) -> Self {
        ApiError::Unavailable {
            message,
            partial: serde_json::to_value(partial).ok(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        let message = value.to_string();
        match value {
            StoreError::NotFound { .. } => ApiError::NotFound(message),
            StoreError::Conflict { .. } | StoreError::AlreadyExists { .. } => {
                ApiError::Conflict(message)
            }
            StoreError::InvalidData(_) => ApiError::Invalid(message),
            StoreError::Unavailable(_) => ApiError::Unavailable {
                message,
                partial: None,
            },
            _ => ApiError::Internal(message),
        }
    }
}

impl From<AllocationError> for ApiError {
    fn from(value: AllocationError) -> Self {
        let message = value.to_string();
        match value {
            AllocationError::InvalidCoordinates(_) => ApiError::Invalid(message),
            AllocationError::Store(err) => err.into(),
            AllocationError::Aborted { partial, .. } => ApiError::unavailable(message, &partial),
        }
    }
}

impl From<ReleaseError> for ApiError {
    fn from(value: ReleaseError) -> Self {
        let message = value.to_string();
        match value {
            ReleaseError::Aborted { partial, .. } => ApiError::unavailable(message, &partial),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message, partial) = match self {
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, "not_found", message, None),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, "conflict", message, None),
            ApiError::Invalid(message) => {
                (StatusCode::BAD_REQUEST, "invalid_request", message, None)
            }
            ApiError::Unavailable { message, partial } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "store_unavailable",
                message,
                partial,
            ),
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                message,
                None,
            ),
        };
        let body = Json(ErrorBody {
            error,
            message,
            partial,
        });
        (status, body).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    category: Option<String>,
    status: Option<String>,
    #[serde(default)]
    available: bool,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    status: String,
}

#[derive(Debug, Deserialize)]
struct AssignPayload {
    resource_id: ResourceId,
    conversation_id: String,
    assigned_by: Option<String>,
}

fn default_count() -> usize {
    1
}

#[derive(Debug, Deserialize)]
struct AssignByTypePayload {
    resource_type: String,
    #[serde(default = "default_count")]
    count: usize,
    conversation_id: String,
    note: Option<String>,
}

#[derive(Debug, Serialize)]
struct AssignByTypeResponse {
    requested: usize,
    assigned_resources: Vec<AssignedResource>,
}

#[derive(Debug, Deserialize)]
struct AssignNearestPayload {
    latitude: f64,
    longitude: f64,
    conversation_id: String,
    #[serde(default)]
    requirements: Vec<ResourceRequirement>,
    assigned_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReleasePayload {
    conversation_id: String,
    resource_ids: Vec<ResourceId>,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    #[serde(flatten)]
    stats: ResourceStats,
    utilization_percent: f64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/resources", get(list_resources))
        .route("/resources/:id", get(get_resource))
        .route("/resources/:id/assignments", get(resource_assignments))
        .route("/resources/:id/status", put(update_status))
        .route("/resources/assign", post(assign_resource))
        .route("/resources/assign-by-type", post(assign_by_type))
        .route("/resources/assign-nearest", post(assign_nearest))
        .route("/resources/release", post(release_resources))
        .route("/incidents/:id/release", post(release_incident))
        .route("/stats", get(stats))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "http api listening");
    axum::serve(listener, app).await
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn list_resources(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Resource>>, ApiError> {
    let category = params
        .category
        .as_deref()
        .map(ResourceCategory::from_str)
        .transpose()
        .map_err(|err| ApiError::invalid(err.to_string()))?;
    let status = params
        .status
        .as_deref()
        .map(ResourceStatus::from_str)
        .transpose()
        .map_err(|err| ApiError::invalid(err.to_string()))?;
    let query = ResourceQuery {
        category,
        status: if params.available {
            Some(ResourceStatus::Available)
        } else {
            status
        },
    };
    Ok(Json(state.store().list_resources(&query).await?))
}

async fn get_resource(
    State(state): State<AppState>,
    Path(resource_id): Path<ResourceId>,
) -> Result<Json<Resource>, ApiError> {
    Ok(Json(state.store().get_resource(resource_id).await?))
}

async fn resource_assignments(
    State(state): State<AppState>,
    Path(resource_id): Path<ResourceId>,
) -> Result<Json<Vec<ResourceAssignment>>, ApiError> {
    state.store().get_resource(resource_id).await?;
    Ok(Json(
        state.store().assignments_for_resource(resource_id).await?,
    ))
}

async fn update_status(
    State(state): State<AppState>,
    Path(resource_id): Path<ResourceId>,
    Json(payload): Json<StatusPayload>,
) -> Result<Json<Resource>, ApiError> {
    let status = ResourceStatus::from_str(payload.status.trim())
        .map_err(|err| ApiError::invalid(err.to_string()))?;
    Ok(Json(state.store().set_status(resource_id, status).await?))
}

async fn assign_resource(
    State(state): State<AppState>,
    Json(payload): Json<AssignPayload>,
) -> Result<(StatusCode, Json<AssignedResource>), ApiError> {
    let assigned = state
        .engine
        .assign_resource(
            payload.resource_id,
            &payload.conversation_id,
            payload.assigned_by.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(assigned)))
}

async fn assign_by_type(
    State(state): State<AppState>,
    Json(payload): Json<AssignByTypePayload>,
) -> Result<Json<AssignByTypeResponse>, ApiError> {
    if payload.resource_type.trim().is_empty() {
        return Err(ApiError::invalid("resource_type must not be empty"));
    }
    let assigned_resources = state
        .engine
        .assign_by_type(
            payload.resource_type.trim(),
            payload.count,
            &payload.conversation_id,
            payload.note.as_deref(),
        )
        .await?;
    Ok(Json(AssignByTypeResponse {
        requested: payload.count,
        assigned_resources,
    }))
}

async fn assign_nearest(
    State(state): State<AppState>,
    Json(payload): Json<AssignNearestPayload>,
) -> Result<Response, ApiError> {
    let incident = Coordinates::new(payload.latitude, payload.longitude)
        .map_err(|err| ApiError::invalid(err.to_string()))?;
    let result: AllocationResult = state
        .engine
        .assign_nearest(
            incident,
            &payload.conversation_id,
            &payload.requirements,
            payload.assigned_by.as_deref(),
        )
        .await?;
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    Ok((status, Json(result)).into_response())
}

async fn release_resources(
    State(state): State<AppState>,
    Json(payload): Json<ReleasePayload>,
) -> Result<Json<ReleaseSummary>, ApiError> {
    Ok(Json(
        state
            .releases
            .release(&payload.resource_ids, &payload.conversation_id)
            .await?,
    ))
}

async fn release_incident(
    State(state): State<AppState>,
    Path(incident_id): Path<String>,
) -> Result<Json<ReleaseSummary>, ApiError> {
    Ok(Json(
        state.releases.release_all_for_incident(&incident_id).await?,
    ))
}

async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let stats = ResourceStats::collect(state.store()).await?;
    Ok(Json(StatsResponse {
        utilization_percent: stats.utilization_percent(),
        stats,
    }))
}
