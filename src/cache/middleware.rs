//! Versioned response cache middleware.
//!
//! Installed per read route with a `ResponseCachePolicy` naming the resource
//! whose version governs the cached response. Only `200 OK` responses are
//! stored, under the version observed before the handler ran.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http_body_util::BodyExt;
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};
use url::form_urlencoded;

use crate::domain::types::Resource;

use super::config::CacheConfig;
use super::envelope::{CachePayload, ResponseSnapshot};
use super::keys::BaseKey;
use super::store::VersionedCacheStore;

pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Which resource version a route's responses follow, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseCachePolicy {
    pub resource: Resource,
    /// Identifies the handler, so two views of one path never share entries.
    pub view: &'static str,
    /// Overrides the configured TTL for the resource.
    pub ttl: Option<Duration>,
}

impl ResponseCachePolicy {
    pub fn new(resource: Resource, view: &'static str) -> Self {
        Self {
            resource,
            view,
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Shared cache state for middleware.
#[derive(Clone)]
pub struct CacheState {
    pub config: CacheConfig,
    pub store: Arc<VersionedCacheStore>,
}

impl CacheState {
    pub fn new(config: CacheConfig, store: Arc<VersionedCacheStore>) -> Self {
        Self { config, store }
    }

    /// Middleware state for one route.
    pub fn route(&self, policy: ResponseCachePolicy) -> RouteCacheState {
        RouteCacheState {
            cache: self.clone(),
            policy,
        }
    }
}

#[derive(Clone)]
pub struct RouteCacheState {
    cache: CacheState,
    policy: ResponseCachePolicy,
}

#[instrument(
    skip_all,
    fields(path = %request.uri().path(), view = route.policy.view)
)]
pub async fn response_cache_layer(
    State(route): State<RouteCacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let RouteCacheState { cache, policy } = route;

    if !cache.config.response_cache_enabled() || request.method() != Method::GET {
        return next.run(request).await;
    }

    let params = query_pairs(request.uri().query());
    let base = BaseKey::response(
        request.uri().path(),
        request.method().as_str(),
        &params,
        policy.view,
    );

    // Pin the version before the handler runs; a write landing meanwhile
    // must not have its result stored under the newer version.
    let Some(key) = cache.store.resolve(&base, policy.resource).await else {
        return next.run(request).await;
    };

    if let Some(CachePayload::Response(snapshot)) = cache.store.get_at(&key).await {
        debug!(cache = "response", outcome = "hit", "serving cached response");
        return build_response(snapshot);
    }

    debug!(
        cache = "response",
        outcome = "miss",
        "cache miss, executing handler"
    );
    let response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match BodyExt::collect(body).await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!(cache = "response", error = %err, "failed to buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if bytes.len() <= cache.config.response_body_limit_bytes {
        match std::str::from_utf8(&bytes) {
            Ok(text) => {
                let snapshot = ResponseSnapshot {
                    status: parts.status.as_u16(),
                    content_type: parts
                        .headers
                        .get(header::CONTENT_TYPE)
                        .and_then(|value| value.to_str().ok())
                        .map(str::to_string),
                    body: text.to_string(),
                    cached_at: OffsetDateTime::now_utc(),
                };
                let ttl = policy
                    .ttl
                    .unwrap_or_else(|| cache.config.response_ttl_for(policy.resource));
                cache
                    .store
                    .set_at(&key, &CachePayload::Response(snapshot), ttl)
                    .await;
            }
            Err(_) => debug!(cache = "response", "skipping non UTF-8 body"),
        }
    } else {
        debug!(
            cache = "response",
            body_bytes = bytes.len(),
            "response body above cache limit"
        );
    }

    parts
        .headers
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("miss"));
    Response::from_parts(parts, Body::from(bytes))
}

/// Decoded query parameters as name/value pairs; a repeated name keeps its
/// last value.
fn query_pairs(query: Option<&str>) -> Vec<(String, String)> {
    let raw = query.unwrap_or_default();
    let pairs: BTreeMap<String, String> = form_urlencoded::parse(raw.as_bytes())
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    pairs.into_iter().collect()
}

/// Build a response from cached data.
fn build_response(snapshot: ResponseSnapshot) -> Response {
    let mut builder = Response::builder()
        .status(snapshot.status)
        .header(CACHE_STATUS_HEADER, "hit");

    if let Some(content_type) = snapshot.content_type.as_deref() {
        if let Ok(value) = HeaderValue::from_str(content_type) {
            builder = builder.header(header::CONTENT_TYPE, value);
        }
    }

    builder
        .body(Body::from(snapshot.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
