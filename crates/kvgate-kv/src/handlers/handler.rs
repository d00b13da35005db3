//! HTTP handlers for KV operations

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use kvgate_core::problemdetails::{self, Problem, ProblemDetails};
use tracing::{error, info, warn};
use utoipa::OpenApi;

use super::types::*;
use crate::error::KvError;
use crate::services::KeyValue;

/// OpenAPI documentation for KV endpoints
#[derive(OpenApi)]
#[openapi(
    paths(kv_set, kv_get, kv_get_all, kv_delete, kv_health),
    components(schemas(
        SetRequest,
        DeleteRequest,
        KeyValue,
        MessageResponse,
        HealthResponse,
        ProblemDetails,
    )),
    tags((name = "KV Store", description = "Key-Value storage operations"))
)]
pub struct KvApiDoc;

/// Configure KV routes
pub fn configure_routes() -> Router<Arc<KvAppState>> {
    Router::new()
        .route("/set", post(kv_set))
        .route("/get", get(kv_get))
        .route("/get-all", get(kv_get_all))
        .route("/delete", post(kv_delete).delete(kv_delete))
        .route("/health", get(kv_health))
}

/// Log store failures before they become a 500; client errors are not logged.
fn report(operation: &str, error: KvError) -> Problem {
    if let KvError::Store(e) = &error {
        error!("KV {} failed: {}", operation, e);
    }
    error.into()
}

/// Bodies are decoded as JSON whatever their Content-Type says.
fn invalid_json(rejection: JsonRejection) -> Problem {
    problemdetails::new(StatusCode::BAD_REQUEST)
        .with_title("Invalid JSON")
        .with_detail(rejection.body_text())
}

fn missing_key() -> Problem {
    problemdetails::new(StatusCode::BAD_REQUEST)
        .with_title("Invalid Request")
        .with_detail("Key parameter is required")
}

/// Store or update a key with a one-hour expiry
#[utoipa::path(
    tag = "KV Store",
    post,
    path = "/set",
    request_body = SetRequest,
    responses(
        (status = 200, description = "Key stored", body = MessageResponse),
        (status = 400, description = "Invalid JSON or empty key", body = ProblemDetails),
        (status = 500, description = "Store error", body = ProblemDetails)
    )
)]
pub async fn kv_set(
    State(state): State<Arc<KvAppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, Problem> {
    let Json(request) = Json::<SetRequest>::from_bytes(&body).map_err(invalid_json)?;
    if request.key.is_empty() {
        return Err(missing_key());
    }

    state
        .kv_service
        .upsert(&request.key, &request.value)
        .await
        .map_err(|e| report("set", e))?;

    Ok(Json(MessageResponse::new("Key stored/updated successfully")))
}

/// Read a key
#[utoipa::path(
    tag = "KV Store",
    get,
    path = "/get",
    params(GetQuery),
    responses(
        (status = 200, description = "Key found", body = KeyValue),
        (status = 400, description = "Missing key parameter", body = ProblemDetails),
        (status = 404, description = "Key not found", body = ProblemDetails),
        (status = 500, description = "Store error", body = ProblemDetails)
    )
)]
pub async fn kv_get(
    State(state): State<Arc<KvAppState>>,
    Query(query): Query<GetQuery>,
) -> Result<impl IntoResponse, Problem> {
    let key = match query.key {
        Some(key) if !key.is_empty() => key,
        _ => return Err(missing_key()),
    };

    let value = state
        .kv_service
        .fetch(&key)
        .await
        .map_err(|e| report("get", e))?;

    Ok(Json(KeyValue { key, value }))
}

/// List every key with its value
///
/// Best-effort: keys that expire or fail to read between the scan and the
/// fetch are left out of the response.
#[utoipa::path(
    tag = "KV Store",
    get,
    path = "/get-all",
    responses(
        (status = 200, description = "All readable entries", body = Vec<KeyValue>),
        (status = 500, description = "Store error", body = ProblemDetails)
    )
)]
pub async fn kv_get_all(State(state): State<Arc<KvAppState>>) -> Result<impl IntoResponse, Problem> {
    let enumeration = state
        .kv_service
        .fetch_all_with_cancel(&state.shutdown)
        .await
        .map_err(|e| report("get-all", e))?;

    if !enumeration.is_complete() {
        warn!(
            "KV get-all returned {} entries, skipped {} unreadable keys",
            enumeration.entries.len(),
            enumeration.skipped.len()
        );
    }

    Ok(Json(enumeration.entries))
}

/// Delete a key
#[utoipa::path(
    tag = "KV Store",
    post,
    path = "/delete",
    request_body = DeleteRequest,
    responses(
        (status = 200, description = "Key deleted", body = MessageResponse),
        (status = 400, description = "Invalid JSON or empty key", body = ProblemDetails),
        (status = 404, description = "Key not found", body = ProblemDetails),
        (status = 500, description = "Store error", body = ProblemDetails)
    )
)]
pub async fn kv_delete(
    State(state): State<Arc<KvAppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, Problem> {
    let Json(request) = Json::<DeleteRequest>::from_bytes(&body).map_err(invalid_json)?;
    if request.key.is_empty() {
        return Err(missing_key());
    }

    state
        .kv_service
        .remove(&request.key)
        .await
        .map_err(|e| report("delete", e))?;

    info!("KV key {} deleted", request.key);

    Ok(Json(MessageResponse::new("Key deleted successfully")))
}

/// Check connectivity to the store
#[utoipa::path(
    tag = "KV Store",
    get,
    path = "/health",
    responses(
        (status = 200, description = "Store reachable", body = HealthResponse),
        (status = 503, description = "Store unreachable", body = ProblemDetails)
    )
)]
pub async fn kv_health(State(state): State<Arc<KvAppState>>) -> Result<impl IntoResponse, Problem> {
    if let Err(e) = state.kv_service.health().await {
        error!("KV health check failed: {}", e);
        return Err(problemdetails::new(StatusCode::SERVICE_UNAVAILABLE)
            .with_title("Service Unavailable")
            .with_detail(e.to_string()));
    }

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
    }))
}
