//! Request ID middleware — adapted from the teacher's `api/request_id.rs`.
//!
//! Every inbound request is assigned a unique `X-Request-ID`: accepted from
//! the caller if already present, freshly generated (UUID v4) otherwise,
//! stored as an axum [`Extension`] so handlers can read it, echoed back on
//! the response, and wrapped in a [`tracing`] span so every log line for the
//! request carries it. Domain-agnostic — carried over unchanged in spirit
//! from the teacher.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Instrument as _;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct RequestId(pub String);

pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    req.extensions_mut().insert(RequestId(id.clone()));

    let span = tracing::debug_span!("request_id", id = %id);
    let mut response = next.run(req).instrument(span).await;

    if let Ok(header_value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert("x-request-id", header_value);
    }

    response
}
