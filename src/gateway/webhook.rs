//! `POST /webhook` — spec.md §4.4 "Webhook".
//!
//! Submits the incoming message to the Router and waits for its terminal
//! event before responding, turning the Router's async, streaming contract
//! into the synchronous request/response shape spec.md §4.4 calls for.

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;

use crate::error::{AppError, GatewayError};
use crate::traffic::TrafficEntry;
use crate::types::{Priority, Route, TaskEvent};

use super::GatewayState;

#[derive(Debug, Deserialize)]
pub struct WebhookRequest {
    pub message: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    pub channel: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub metadata: Value,
}

pub async fn handle_webhook(state: &Arc<GatewayState>, body: WebhookRequest) -> Result<Value, AppError> {
    let message = body.message.ok_or(GatewayError::MissingMessage)?;
    let channel_id = body.channel.unwrap_or_else(|| "webhook".to_string());
    let user_id = body.user_id.unwrap_or_else(|| "anonymous".to_string());

    let mut events = state.router.subscribe();
    let started = Instant::now();
    let ack = state
        .router
        .submit(channel_id.clone(), user_id, message)
        .await
        .map_err(GatewayError::Router)?;

    let mut route = Route::Local;
    loop {
        match events.recv().await {
            Ok(TaskEvent::Routed { id, route: r, .. }) if id == ack.id => {
                route = r;
            }
            Ok(TaskEvent::Complete { id, response }) if id == ack.id => {
                record(state, &channel_id, route, started, true, None);
                return Ok(json!({ "response": response }));
            }
            Ok(TaskEvent::Error { id, error }) if id == ack.id => {
                record(state, &channel_id, route, started, false, Some(error.clone()));
                return Err(anyhow::anyhow!("task {id} failed: {error}").into());
            }
            Ok(TaskEvent::Cancelled { id }) if id == ack.id => {
                record(state, &channel_id, route, started, false, Some("cancelled".to_string()));
                return Err(GatewayError::Router(crate::error::RouterError::Cancelled).into());
            }
            Ok(_) => continue,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return Err(anyhow::anyhow!("router event stream closed").into()),
        }
    }
}

fn record(state: &Arc<GatewayState>, channel_id: &str, route: Route, started: Instant, success: bool, error: Option<String>) {
    let mut entry = TrafficEntry::new(
        channel_id.to_string(),
        route,
        route_provider_label(route),
        Priority::Normal,
        started.elapsed().as_millis() as u64,
        success,
    );
    if let Some(err) = error {
        entry = entry.with_error(err);
    }
    state.traffic.push(entry);
}

fn route_provider_label(route: Route) -> String {
    match route {
        Route::Local => "local".to_string(),
        Route::Cloud => "cloud".to_string(),
    }
}
