//! HTTP API Layer

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Extension, Query},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::aggregator::Aggregator;
use crate::cluster::cluster_items;
use crate::config::AppConfig;
use crate::enrich::Enricher;
use crate::kv::now_ms;
use crate::registry::FeedRegistry;
use crate::search;
use crate::signing::{hmac_hex, sha256_hex};
use crate::stream;
use crate::taxonomy;

pub const DEFAULT_SINCE_HOURS: f64 = 24.0;
pub const DEFAULT_FEED_LIMIT: usize = 80;
pub const DEFAULT_ENRICH_LIMIT: usize = 40;
pub const DEFAULT_MIN_SOURCES: usize = 1;

/// Shared handler state, injected via `Extension<Arc<ApiState>>`.
pub struct ApiState {
    pub config: AppConfig,
    pub registry: Arc<FeedRegistry>,
    pub aggregator: Arc<Aggregator>,
    pub enricher: Arc<Enricher>,
}

/// Client and internal failures, rendered as the JSON error envelope. The
/// API never 500s on upstream trouble; this type is for our own faults.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "ok": false, "error": self.message }));
        (self.status, body).into_response()
    }
}

pub fn create_router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static("x-requested-with"),
        ]);

    Router::new()
        .route("/api/health", get(health).options(preflight))
        .route("/api/sources", get(sources).options(preflight))
        .route("/api/feeds", get(feeds).options(preflight))
        .route("/api/clusters", get(clusters).options(preflight))
        .route("/api/enrich", get(enrich).options(preflight))
        .route(
            "/api/clusters/enriched",
            get(clusters_enriched).options(preflight),
        )
        .route("/api/search", get(search_items).options(preflight))
        .route("/api/topics", get(topics).options(preflight))
        .route("/api/stream", get(stream_events).options(preflight))
        .fallback(fallback)
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::VARY,
            HeaderValue::from_static("Origin"),
        ))
        .layer(Extension(state))
}

/// Plain OPTIONS answers 204 on every path; browser preflights are handled
/// by the CORS layer before they reach the router.
async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn fallback(method: Method) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }
    ApiError {
        status: StatusCode::NOT_FOUND,
        message: "not found".into(),
    }
    .into_response()
}

fn query_param<T>(
    params: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ApiError>
where
    T: std::str::FromStr,
{
    match params.get(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ApiError::bad_request(format!("invalid {name}"))),
    }
}

fn since_hours_param(params: &HashMap<String, String>, default: f64) -> Result<f64, ApiError> {
    let v: f64 = query_param(params, "sinceHours", default)?;
    if !v.is_finite() || v < 0.0 {
        return Err(ApiError::bad_request("invalid sinceHours"));
    }
    Ok(v)
}

/// Serialize once, then attach caching, signature and ETag headers computed
/// over those exact bytes.
fn payload_response<T: Serialize>(
    state: &ApiState,
    value: &T,
    cache_control: Option<&str>,
    signed: bool,
    with_etag: bool,
) -> Result<Response, ApiError> {
    let body = serde_json::to_string(value).map_err(|e| ApiError::internal(e.to_string()))?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cc) = cache_control {
        builder = builder.header(header::CACHE_CONTROL, cc);
    }
    if with_etag {
        builder = builder.header(header::ETAG, sha256_hex(body.as_bytes()));
    }
    if signed {
        if let Some(secret) = &state.config.api_secret {
            builder = builder.header("X-Signature", hmac_hex(secret, body.as_bytes()));
        }
    }
    builder
        .body(Body::from(body))
        .map_err(|e| ApiError::internal(e.to_string()))
}

async fn health(Extension(state): Extension<Arc<ApiState>>) -> Result<Response, ApiError> {
    let body = json!({
        "ok": true,
        "ts": now_ms(),
        "sources": state.registry.len(),
    });
    payload_response(&state, &body, Some("no-cache"), true, false)
}

async fn sources(Extension(state): Extension<Arc<ApiState>>) -> Result<Response, ApiError> {
    payload_response(
        &state,
        &state.registry.list(),
        Some("public, max-age=3600"),
        false,
        false,
    )
}

async fn feeds(
    Extension(state): Extension<Arc<ApiState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let since = since_hours_param(&params, DEFAULT_SINCE_HOURS)?;
    let limit = query_param(&params, "limit", DEFAULT_FEED_LIMIT)?;
    let items = state.aggregator.aggregate(since, limit).await;
    payload_response(&state, &items, Some("public, max-age=120"), true, true)
}

async fn clusters(
    Extension(state): Extension<Arc<ApiState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let since = since_hours_param(&params, DEFAULT_SINCE_HOURS)?;
    let limit = query_param(&params, "limit", DEFAULT_FEED_LIMIT)?;
    let min_sources = query_param(&params, "minSources", DEFAULT_MIN_SOURCES)?;
    let clusters = state
        .aggregator
        .aggregate_clusters(since, limit, min_sources)
        .await;
    payload_response(&state, &clusters, None, true, false)
}

async fn enrich(
    Extension(state): Extension<Arc<ApiState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let since = since_hours_param(&params, DEFAULT_SINCE_HOURS)?;
    let limit = query_param(&params, "limit", DEFAULT_ENRICH_LIMIT)?;
    let items = state.aggregator.aggregate(since, limit).await;
    let enriched = state.enricher.enrich_items(items).await;
    let body = json!({ "count": enriched.len(), "items": enriched });
    payload_response(&state, &body, Some("no-store"), true, false)
}

async fn clusters_enriched(
    Extension(state): Extension<Arc<ApiState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let since = since_hours_param(&params, DEFAULT_SINCE_HOURS)?;
    let limit = query_param(&params, "limit", DEFAULT_ENRICH_LIMIT)?;
    let min_sources = query_param(&params, "minSources", DEFAULT_MIN_SOURCES)?;

    let window = state.aggregator.aggregate(since, limit * 2).await;
    let enriched = state.enricher.enrich_items(window).await;
    let mut clusters = cluster_items(enriched);
    clusters.retain(|c| c.sources.len() >= min_sources);
    clusters.truncate(limit);
    payload_response(&state, &clusters, Some("no-store"), true, false)
}

async fn search_items(
    Extension(state): Extension<Arc<ApiState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let q = params.get("q").cloned().unwrap_or_default();
    let since = since_hours_param(&params, search::DEFAULT_SINCE_HOURS)?;
    let limit = query_param(&params, "limit", search::DEFAULT_LIMIT)?;

    let window = state.aggregator.aggregate(since, search::WINDOW_LIMIT).await;
    let items = search::filter_items(&window, &q, limit);
    let body = json!({ "q": q, "count": items.len(), "items": items });
    payload_response(&state, &body, None, false, false)
}

async fn topics(Extension(state): Extension<Arc<ApiState>>) -> Result<Response, ApiError> {
    let body = json!({
        "topics": taxonomy::topic_labels(),
        "regions": state.registry.regions(),
        "geoBuckets": taxonomy::geo_labels(),
    });
    payload_response(&state, &body, Some("public, max-age=3600"), false, false)
}

async fn stream_events(
    Extension(state): Extension<Arc<ApiState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let since = since_hours_param(&params, stream::DEFAULT_SINCE_HOURS)?;
    let interval: u64 = query_param(&params, "intervalMs", stream::DEFAULT_INTERVAL_MS)?;
    Ok(stream::sse_stream(
        Arc::clone(&state.aggregator),
        since,
        interval,
    ))
}
