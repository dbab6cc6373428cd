//! Admin listener: content writes, cache inspection and manual invalidation.

use std::collections::BTreeMap;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::application::error::{AppError, ErrorReport};
use crate::cache::MutationKind;

use super::middleware::{log_responses, set_request_context};
use super::response::{ApiError, ApiResponse, created};
use super::{AppState, path_resource};

pub fn build_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/health", get(health))
        .route("/admin/cache/versions", get(cache_versions))
        .route(
            "/admin/cache/{resource}/invalidate",
            post(invalidate_resource),
        )
        .route("/admin/{resource}", post(create_document))
        .route(
            "/admin/{resource}/{id}",
            get(get_document)
                .put(update_document)
                .delete(delete_document),
        )
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

fn parse_payload(body: &Bytes) -> Result<Value, AppError> {
    serde_json::from_slice(body).map_err(|err| AppError::validation(format!("invalid payload: {err}")))
}

async fn create_document(
    State(state): State<AppState>,
    Path(resource): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    const SOURCE: &str = "infra::http::admin::create_document";
    let resource = path_resource(&resource).map_err(|err| ApiError::new(SOURCE, err))?;
    let payload = parse_payload(&body).map_err(|err| ApiError::new(SOURCE, err))?;

    let stored = state
        .content
        .create(resource, payload)
        .await
        .map_err(|err| ApiError::new(SOURCE, err))?;
    Ok(created(stored))
}

async fn get_document(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, i64)>,
) -> Result<ApiResponse<Value>, ApiError> {
    const SOURCE: &str = "infra::http::admin::get_document";
    let resource = path_resource(&resource).map_err(|err| ApiError::new(SOURCE, err))?;

    let document = state
        .content
        .get(resource, id)
        .await
        .map_err(|err| ApiError::new(SOURCE, err))?;
    Ok(ApiResponse::ok(document))
}

async fn update_document(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, i64)>,
    body: Bytes,
) -> Result<ApiResponse<Value>, ApiError> {
    const SOURCE: &str = "infra::http::admin::update_document";
    let resource = path_resource(&resource).map_err(|err| ApiError::new(SOURCE, err))?;
    let payload = parse_payload(&body).map_err(|err| ApiError::new(SOURCE, err))?;

    let stored = state
        .content
        .update(resource, id, payload)
        .await
        .map_err(|err| ApiError::new(SOURCE, err))?;
    Ok(ApiResponse::ok(stored))
}

async fn delete_document(
    State(state): State<AppState>,
    Path((resource, id)): Path<(String, i64)>,
) -> Result<StatusCode, ApiError> {
    const SOURCE: &str = "infra::http::admin::delete_document";
    let resource = path_resource(&resource).map_err(|err| ApiError::new(SOURCE, err))?;

    state
        .content
        .delete(resource, id)
        .await
        .map_err(|err| ApiError::new(SOURCE, err))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn cache_versions(State(state): State<AppState>) -> ApiResponse<BTreeMap<&'static str, u64>> {
    let versions = state
        .cache
        .versions()
        .snapshot()
        .await
        .into_iter()
        .map(|(resource, version)| (resource.as_str(), version))
        .collect();
    ApiResponse::ok(versions)
}

#[derive(Debug, Serialize)]
struct AppliedBump {
    resource: &'static str,
    version: u64,
}

async fn invalidate_resource(
    State(state): State<AppState>,
    Path(resource): Path<String>,
) -> Result<ApiResponse<Vec<AppliedBump>>, ApiError> {
    const SOURCE: &str = "infra::http::admin::invalidate_resource";
    let resource = path_resource(&resource).map_err(|err| ApiError::new(SOURCE, err))?;

    let applied = state
        .cache
        .trigger
        .resource_changed(resource, MutationKind::Manual)
        .await
        .into_iter()
        .map(|(resource, version)| AppliedBump {
            resource: resource.as_str(),
            version,
        })
        .collect();
    Ok(ApiResponse::ok(applied))
}

#[derive(Debug, Serialize)]
struct HealthReport {
    database: &'static str,
    cache_backend: &'static str,
    cache: &'static str,
}

async fn health(State(state): State<AppState>) -> Response {
    let mut failures = Vec::new();

    let database = match state.database.as_ref() {
        Some(db) => match db.health_check().await {
            Ok(()) => "ok",
            Err(err) => {
                failures.push(format!("database: {err}"));
                "unavailable"
            }
        },
        None => "in_memory",
    };

    let cache = match state.cache.store.health_check().await {
        Ok(()) => "ok",
        Err(err) => {
            failures.push(format!("cache: {err}"));
            "unavailable"
        }
    };

    let report = HealthReport {
        database,
        cache_backend: state.cache.store.backend_name(),
        cache,
    };

    if failures.is_empty() {
        return ApiResponse::ok(report).into_response();
    }

    let mut response = (StatusCode::SERVICE_UNAVAILABLE, Json(report)).into_response();
    ErrorReport {
        source: "infra::http::admin::health",
        status: StatusCode::SERVICE_UNAVAILABLE,
        messages: failures,
    }
    .attach(&mut response);
    response
}
