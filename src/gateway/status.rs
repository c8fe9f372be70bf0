//! Liveness, status and admin observability handlers — spec.md §6 plus the
//! ambient admin surface. `health`/`api_status` implement the spec's exact
//! response shapes; `admin_status`/`admin_traffic`/`metrics` generalize the
//! teacher's `api/health.rs`, `api/status.rs` and `api/metrics.rs`.

use std::sync::Arc;

use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use super::GatewayState;

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().timestamp_millis(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn api_status(state: Arc<GatewayState>) -> impl IntoResponse {
    let config = state.config.read().await;
    let routing = match config.routing.mode {
        crate::types::RoutingMode::Auto => "auto",
        crate::types::RoutingMode::Local => "local",
        crate::types::RoutingMode::Cloud => "cloud",
    };
    let local_model = config.providers.get("local").and_then(|p| p.model.clone());

    Json(json!({
        "routing": routing,
        "localModel": local_model,
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

pub async fn admin_status(state: Arc<GatewayState>) -> impl IntoResponse {
    let snapshot = state.router.status().await;
    let chunk_count = state.memory.chunk_count().await;

    Json(json!({
        "queue": snapshot,
        "memoryChunks": chunk_count,
        "uptimeSeconds": (chrono::Utc::now() - state.started_at).num_seconds(),
    }))
}

pub async fn admin_traffic(state: Arc<GatewayState>) -> impl IntoResponse {
    let recent = state.traffic.recent(50).await;
    let stats = state.traffic.stats().await;
    Json(json!({ "recent": recent, "stats": stats }))
}

/// Prometheus text exposition format — gauges only, no histograms, mirroring
/// the teacher's `api/metrics.rs` scope.
pub async fn metrics(state: Arc<GatewayState>) -> impl IntoResponse {
    let snapshot = state.router.status().await;
    let stats = state.traffic.stats().await;

    let mut out = String::new();
    out.push_str("# HELP agent_runtime_queue_depth Number of tasks currently queued.\n");
    out.push_str("# TYPE agent_runtime_queue_depth gauge\n");
    out.push_str(&format!("agent_runtime_queue_depth{{priority=\"urgent\"}} {}\n", snapshot.urgent_count));
    out.push_str(&format!("agent_runtime_queue_depth{{priority=\"normal\"}} {}\n", snapshot.normal_count));
    out.push_str(&format!("agent_runtime_queue_depth{{priority=\"background\"}} {}\n", snapshot.background_count));
    out.push_str("# HELP agent_runtime_requests_total Total completed requests recorded in the traffic log.\n");
    out.push_str("# TYPE agent_runtime_requests_total counter\n");
    out.push_str(&format!("agent_runtime_requests_total {}\n", stats.total_requests));
    out.push_str("# HELP agent_runtime_errors_total Total failed requests recorded in the traffic log.\n");
    out.push_str("# TYPE agent_runtime_errors_total counter\n");
    out.push_str(&format!("agent_runtime_errors_total {}\n", stats.error_count));
    out.push_str("# HELP agent_runtime_latency_ms_avg Average task latency in milliseconds.\n");
    out.push_str("# TYPE agent_runtime_latency_ms_avg gauge\n");
    out.push_str(&format!("agent_runtime_latency_ms_avg {}\n", stats.avg_latency_ms));

    ([("content-type", "text/plain; version=0.0.4")], out)
}
