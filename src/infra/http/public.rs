//! Public read API and the contact form.
//!
//! Every GET route carries the versioned response cache; list routes also
//! go through the query cache inside `ContentService::list`.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;

use axum::{
    Router,
    body::Body,
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, Request, header},
    middleware,
    response::Response,
    routing::{MethodRouter, get, post},
};
use http_body_util::BodyExt;
use serde::Serialize;
use serde_json::json;

use crate::application::contact::ContactClient;
use crate::application::error::AppError;
use crate::cache::{CacheState, ResponseCachePolicy, response_cache_layer};
use crate::domain::entities::ContactInput;
use crate::domain::types::Resource;

use super::AppState;
use super::middleware::{log_responses, set_request_context};
use super::response::{ApiError, ApiResponse, ListData, created};

const FORWARDED_FOR: &str = "x-forwarded-for";

pub fn build_router(state: AppState) -> Router {
    let cache = state.cache.middleware_state();

    Router::new()
        .route(
            "/common/all-configs",
            cached(
                &cache,
                ResponseCachePolicy::new(Resource::Settings, "common.all_configs"),
                get(all_configs),
            ),
        )
        .route(
            "/common/skills/list",
            list_route(&cache, Resource::Skills, "common.skills.list"),
        )
        .route(
            "/common/links/list",
            list_route(&cache, Resource::Links, "common.links.list"),
        )
        .route(
            "/common/links/view/{id}",
            view_route(&cache, Resource::Links, "common.links.view"),
        )
        .route("/common/contacts/create", post(create_contact))
        .route(
            "/info/blogs/list",
            list_route(&cache, Resource::Blogs, "info.blogs.list"),
        )
        .route(
            "/info/blogs/view/{id}",
            view_route(&cache, Resource::Blogs, "info.blogs.view"),
        )
        .route(
            "/info/experiences/list",
            list_route(&cache, Resource::Experiences, "info.experiences.list"),
        )
        .route(
            "/info/experiences/view/{id}",
            view_route(&cache, Resource::Experiences, "info.experiences.view"),
        )
        .route(
            "/info/projects/list",
            list_route(&cache, Resource::Projects, "info.projects.list"),
        )
        .route(
            "/info/projects/view/{id}",
            view_route(&cache, Resource::Projects, "info.projects.view"),
        )
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

fn cached(
    cache: &CacheState,
    policy: ResponseCachePolicy,
    route: MethodRouter<AppState>,
) -> MethodRouter<AppState> {
    route.layer(middleware::from_fn_with_state(
        cache.route(policy),
        response_cache_layer,
    ))
}

fn list_route(cache: &CacheState, resource: Resource, view: &'static str) -> MethodRouter<AppState> {
    let handler = move |State(state): State<AppState>,
                        Query(params): Query<HashMap<String, String>>| async move {
        let envelope = state
            .content
            .list(resource, &params)
            .await
            .map_err(|err| ApiError::new("infra::http::public::list", err))?;
        Ok::<_, ApiError>(ApiResponse::ok(ListData::from(envelope)))
    };
    cached(cache, ResponseCachePolicy::new(resource, view), get(handler))
}

fn view_route(cache: &CacheState, resource: Resource, view: &'static str) -> MethodRouter<AppState> {
    let handler = move |State(state): State<AppState>, Path(id): Path<i64>| async move {
        let document = state
            .content
            .get(resource, id)
            .await
            .map_err(|err| ApiError::new("infra::http::public::view", err))?;
        Ok::<_, ApiError>(ApiResponse::ok(document))
    };
    cached(cache, ResponseCachePolicy::new(resource, view), get(handler))
}

#[derive(Debug, Serialize)]
struct SiteConfigs {
    #[serde(rename = "baseLinks")]
    base_links: BTreeMap<String, String>,
}

async fn all_configs(State(state): State<AppState>) -> ApiResponse<SiteConfigs> {
    ApiResponse::ok(SiteConfigs {
        base_links: state.site.base_links.clone(),
    })
}

async fn create_contact(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Result<Response, ApiError> {
    const SOURCE: &str = "infra::http::public::create_contact";

    let (parts, body) = request.into_parts();
    let body = BodyExt::collect(body)
        .await
        .map_err(|err| {
            ApiError::new(SOURCE, AppError::validation(format!("unreadable body: {err}")))
        })?
        .to_bytes();
    let input: ContactInput = serde_json::from_slice(&body).map_err(|err| {
        ApiError::new(SOURCE, AppError::validation(format!("invalid payload: {err}")))
    })?;

    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let client = ContactClient::from_parts(
        header_value(&parts.headers, FORWARDED_FOR),
        peer,
        header_value(&parts.headers, header::USER_AGENT.as_str()),
    );

    let id = state
        .contacts
        .submit(input, client)
        .await
        .map_err(|err| ApiError::new(SOURCE, err))?;
    Ok(created(json!({ "id": id })))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
