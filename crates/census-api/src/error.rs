//! API error type and [`axum::response::IntoResponse`] implementation.

use std::error::Error as StdError;

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn StdError + Send + Sync>),
}

impl ApiError {
  /// Classify a backend error by the [`census_core::Error`] somewhere in its
  /// source chain. Errors without one are reported as store failures.
  pub fn from_store<E>(err: E) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    use census_core::Error as Core;

    let Some(core) = find_core(&err) else {
      return ApiError::Store(Box::new(err));
    };
    let message = core.to_string();
    match core {
      Core::NotFound(_) => ApiError::NotFound(message),
      Core::InvalidVersion(_) | Core::InvalidField { .. } => ApiError::BadRequest(message),
      Core::Conflict(_)
      | Core::VersionAhead { .. }
      | Core::Stale { .. }
      | Core::VersionNotFound { .. }
      | Core::WriteConflict { .. } => ApiError::Conflict(message),
      Core::UnsupportedFormat(_) | Core::Serialization(_) => ApiError::Store(Box::new(err)),
    }
  }
}

fn find_core<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a census_core::Error> {
  let mut current = Some(err);
  while let Some(e) = current {
    if let Some(core) = e.downcast_ref::<census_core::Error>() {
      return Some(core);
    }
    current = e.source();
  }
  None
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Store(e) => {
        tracing::error!(error = %e, "store failure");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message })))
      .into_response()
  }
}
