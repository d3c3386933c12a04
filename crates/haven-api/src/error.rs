//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Rejections keep their typed shape on the wire: field and entity failures
//! become 400 with an `invalid-params` list, missing entities 404, and lost
//! optimistic-concurrency races 409.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use haven_core::{Outcome, Rejection};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("rejected: {0}")]
  Rejected(Rejection),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("engine error: {0}")]
  Engine(#[from] haven_core::Error),
}

impl From<Rejection> for ApiError {
  fn from(r: Rejection) -> Self { Self::Rejected(r) }
}

/// Flatten an engine result into a handler result.
pub(crate) fn respond<T>(result: haven_core::Result<Outcome<T>>) -> Result<Json<T>, ApiError> {
  Ok(Json(result??))
}

fn invalid_params(rejection: &Rejection) -> serde_json::Value {
  match rejection {
    Rejection::Field { path, code } => json!([{
      "propertyName": path,
      "errorType":    code.as_str(),
    }]),
    Rejection::Entity { path, code, entity_id, value } => json!([{
      "propertyName": path,
      "errorType":    code.as_str(),
      "entityId":     entity_id,
      "value":        value,
    }]),
    Rejection::NotFound { .. } | Rejection::Conflict { .. } => json!([]),
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, body) = match &self {
      ApiError::Rejected(r @ (Rejection::Field { .. } | Rejection::Entity { .. })) => (
        StatusCode::BAD_REQUEST,
        json!({
          "status":         400,
          "detail":         "There is a problem with your request",
          "invalid-params": invalid_params(r),
        }),
      ),
      ApiError::Rejected(r @ Rejection::NotFound { .. }) => (
        StatusCode::NOT_FOUND,
        json!({ "status": 404, "detail": r.to_string() }),
      ),
      ApiError::Rejected(r @ Rejection::Conflict { .. }) => (
        StatusCode::CONFLICT,
        json!({ "status": 409, "detail": r.to_string() }),
      ),
      ApiError::BadRequest(m) => (
        StatusCode::BAD_REQUEST,
        json!({ "status": 400, "detail": m }),
      ),
      ApiError::Engine(e) => {
        error!(error = %e, "lifecycle operation failed");
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          json!({ "status": 500, "detail": e.to_string() }),
        )
      }
    };
    (status, Json(body)).into_response()
  }
}
