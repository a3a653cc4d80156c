//! HTTP error mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use qanalysis_core::QueueError;
use serde::Serialize;

/// Errors surfaced by the HTTP handlers.
///
/// Every variant answers `400 Bad Request` with a `{"message": ...}` body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid problem data: {0}")]
    InvalidInput(String),

    #[error("limit error: rate {requested:.3} req/min exceeds maximum {max:.3} req/min")]
    RateLimit { requested: f64, max: f64 },

    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        tracing::warn!(error = %message, "request rejected");
        (StatusCode::BAD_REQUEST, Json(ErrorBody { message })).into_response()
    }
}
