//! Channel Gateway — spec.md §4.4.
//!
//! New relative to the teacher (whose client/admin APIs are a fixed set of
//! routes wired straight into axum's own router): a general HTTP
//! path-router (`pathrouter`), webhook ingestion (`webhook`), and a bot
//! long-poll worker (`botpoll`). Built the way the teacher builds its axum
//! sub-routers — `build_router` returns a configured `Router`, wired
//! through the same middleware stack shape (request-id, rate-limit, trace)
//! as `api::client::router`/`api::admin::router`, just renamed to this
//! crate's domain.

pub mod botpoll;
pub mod pathrouter;
pub mod rate_limit;
pub mod request_id;
pub mod status;
pub mod webhook;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::RwLock;

use crate::config::AppConfig;
use crate::memory::MemoryEngine;
use crate::router::RouterHandle;
use crate::traffic::TrafficLog;

use pathrouter::PathRouter;
use rate_limit::RateLimiter;

/// Shared state handed to every gateway handler and middleware, mirroring
/// the teacher's `Arc<RouterState>` but scoped to this crate's domain.
pub struct GatewayState {
    pub router: RouterHandle,
    pub memory: Arc<MemoryEngine>,
    pub config: Arc<RwLock<AppConfig>>,
    pub traffic: Arc<TrafficLog>,
    pub rate_limiter: Option<RateLimiter>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteName {
    Health,
    ApiStatus,
    Webhook,
    AdminStatus,
    AdminTraffic,
    Metrics,
}

fn routes() -> PathRouter<RouteName> {
    let mut router = PathRouter::new();
    router.register(Method::GET, "/health", RouteName::Health);
    router.register(Method::GET, "/api/status", RouteName::ApiStatus);
    router.register(Method::POST, "/webhook", RouteName::Webhook);
    router.register(Method::GET, "/admin/status", RouteName::AdminStatus);
    router.register(Method::GET, "/admin/traffic", RouteName::AdminTraffic);
    router.register(Method::GET, "/metrics", RouteName::Metrics);
    router
}

/// Build the gateway's axum router: a single fallback handler that defers
/// all matching to [`pathrouter::PathRouter`] rather than axum's own route
/// table, so the spec's `:name`/`*`/longest-path-first semantics apply.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit::rate_limit_middleware))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}

async fn dispatch(State(state): State<Arc<GatewayState>>, req: Request) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let router = routes();
    let Some(matched) = router.match_route(&method, &path) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response();
    };
    let route = *matched.handler;

    match route {
        RouteName::Health => status::health().await.into_response(),
        RouteName::ApiStatus => status::api_status(state).await.into_response(),
        RouteName::AdminStatus => status::admin_status(state).await.into_response(),
        RouteName::AdminTraffic => status::admin_traffic(state).await.into_response(),
        RouteName::Metrics => status::metrics(state).await.into_response(),
        RouteName::Webhook => handle_webhook_request(state, req).await,
    }
}

async fn handle_webhook_request(state: Arc<GatewayState>, req: Request) -> Response {
    let body = match axum::body::to_bytes(req.into_body(), 1024 * 1024).await {
        Ok(bytes) => bytes,
        Err(_) => return (StatusCode::BAD_REQUEST, Json(json!({ "error": "body too large or unreadable" }))).into_response(),
    };

    let payload: webhook::WebhookRequest = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_) => return (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid JSON body" }))).into_response(),
    };

    match webhook::handle_webhook(&state, payload).await {
        Ok(value) => Json(value).into_response(),
        Err(err) => err.into_response(),
    }
}
