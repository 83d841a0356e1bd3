//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every failure renders as `{ "ok": false, "message": ... }`.

use axum::{
  Json,
  extract::rejection::{JsonRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("{0}")]
  BadRequest(String),

  /// A share token that failed to decode.
  #[error("link is invalid")]
  InvalidToken(#[source] rapport_core::Error),

  /// An alias that is unknown or past its expiry.
  #[error("link has expired")]
  StaleAlias,

  #[error("{0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<rapport_core::Error> for ApiError {
  fn from(e: rapport_core::Error) -> Self {
    if e.is_invalid_token() {
      ApiError::InvalidToken(e)
    } else {
      ApiError::BadRequest(e.to_string())
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(e: JsonRejection) -> Self { ApiError::BadRequest(e.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(e: QueryRejection) -> Self { ApiError::BadRequest(e.body_text()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self {
      ApiError::BadRequest(_) | ApiError::InvalidToken(_) => StatusCode::BAD_REQUEST,
      ApiError::StaleAlias => StatusCode::NOT_FOUND,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = match &self {
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        "internal server error".to_owned()
      }
      other => {
        tracing::warn!(status = status.as_u16(), error = ?other, "request rejected");
        other.to_string()
      }
    };

    (status, Json(json!({ "ok": false, "message": message }))).into_response()
  }
}

pub(crate) fn store_error<E>(e: E) -> ApiError
where
  E: std::error::Error + Send + Sync + 'static,
{
  ApiError::Store(Box::new(e))
}
