//! Error taxonomy (spec §7) plus the axum `IntoResponse` glue.
//!
//! [`AppError`] wraps [`anyhow::Error`] and converts it into an HTTP response
//! automatically via [`IntoResponse`] — the same pattern the teacher crate
//! uses: handlers return `Result<T, AppError>` and propagate with `?`,
//! with no manual `map_err`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Typed error taxonomy — spec §7.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("queue is full and no background task can be evicted")]
    QueueFull,
    #[error("no executor available for the computed route")]
    NoExecutorAvailable,
    #[error("task {0} not found")]
    NotFound(String),
    #[error("request timed out")]
    RequestTimeout,
    #[error("task cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("stored chunk {key} failed integrity verification")]
    Integrity { key: String },
    #[error("chunk {0} not found")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider `{provider}` returned HTTP {status}: {message}")]
    Upstream {
        provider: String,
        status: u16,
        message: String,
    },
    #[error("unknown provider `{0}`")]
    UnknownProvider(String),
    #[error("unknown model `{0}`")]
    UnknownModel(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("invalid passphrase")]
    InvalidPassphrase,
    #[error("credential store io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("missing `message` field")]
    MissingMessage,
    #[error("router error: {0}")]
    Router(#[from] RouterError),
}

/// Wraps [`anyhow::Error`] so it can be returned from axum handlers.
///
/// Any type that implements `Into<anyhow::Error>` (which includes `io::Error`,
/// `reqwest::Error`, and any `#[derive(thiserror::Error)]` type) can be
/// converted into an [`AppError`] via the blanket [`From`] implementation.
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.0, "handler error");
        let status = classify(&self.0);
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Map known error types to their HTTP status; anything else is a 500.
fn classify(err: &anyhow::Error) -> StatusCode {
    if err.downcast_ref::<GatewayError>().is_some() {
        return StatusCode::BAD_REQUEST;
    }
    if let Some(e) = err.downcast_ref::<RouterError>() {
        return match e {
            RouterError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            RouterError::NoExecutorAvailable => StatusCode::SERVICE_UNAVAILABLE,
            RouterError::NotFound(_) => StatusCode::NOT_FOUND,
            RouterError::RequestTimeout => StatusCode::GATEWAY_TIMEOUT,
            RouterError::Cancelled => StatusCode::BAD_REQUEST,
        };
    }
    if err.downcast_ref::<CredentialError>().is_some() {
        return StatusCode::UNAUTHORIZED;
    }
    if err.downcast_ref::<ProviderError>().is_some() {
        return StatusCode::BAD_GATEWAY;
    }
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Convert any `Into<anyhow::Error>` into an [`AppError`].
///
/// This is the idiomatic axum pattern — see
/// <https://docs.rs/axum/latest/axum/error_handling/index.html>.
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(e: E) -> Self {
        Self(e.into())
    }
}
