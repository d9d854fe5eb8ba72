//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error body is `{"error": <message>, "kind": <kind>}`. `kind` lets a
//! view tell a denial (`denied`) apart from a transient failure (`retry`).

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use coursegate_core::store::StoreError;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("authentication required")]
  Unauthorized,

  #[error("{0}")]
  Forbidden(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("payment gateway error: {0}")]
  BadGateway(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Classify a backend error: domain outcomes keep their meaning, anything
  /// else is an infrastructure failure.
  pub fn store<E: StoreError>(err: E) -> Self {
    match err.domain() {
      Some(domain) => Self::domain(domain),
      None => {
        tracing::error!(error = %err, "store failure");
        Self::Store(Box::new(err))
      }
    }
  }

  fn domain(err: &coursegate_core::Error) -> Self {
    use coursegate_core::Error as E;
    let message = err.to_string();
    match err {
      E::NotAuthenticated => Self::Unauthorized,
      E::UpgradeRequired { .. } => Self::Forbidden(message),
      E::ProfileNotFound(_)
      | E::CourseNotFound(_)
      | E::ModuleNotFound(_)
      | E::DownloadNotFound(_)
      | E::EntitlementNotFound(_)
      | E::UpgradeNotFound(_) => Self::NotFound(message),
      E::AlreadyEntitled { .. }
      | E::AlreadyAtTier { .. }
      | E::DuplicateModulePosition { .. }
      | E::InvalidTransition { .. } => Self::Conflict(message),
      E::InvalidTier(_)
      | E::InvalidInput(_)
      | E::PaymentVerificationMismatch(_)
      | E::Serialization(_) => Self::BadRequest(message),
    }
  }

  fn kind(&self) -> &'static str {
    match self {
      Self::Unauthorized => "unauthenticated",
      Self::Forbidden(_) => "denied",
      Self::NotFound(_) => "not_found",
      Self::BadRequest(_) => "invalid",
      Self::Conflict(_) => "conflict",
      Self::BadGateway(_) | Self::Store(_) => "retry",
    }
  }
}

impl From<coursegate_core::Error> for ApiError {
  fn from(err: coursegate_core::Error) -> Self { Self::domain(&err) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self {
      Self::Unauthorized => StatusCode::UNAUTHORIZED,
      Self::Forbidden(_) => StatusCode::FORBIDDEN,
      Self::NotFound(_) => StatusCode::NOT_FOUND,
      Self::BadRequest(_) => StatusCode::BAD_REQUEST,
      Self::Conflict(_) => StatusCode::CONFLICT,
      Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
      Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = json!({ "error": self.to_string(), "kind": self.kind() });
    (status, Json(body)).into_response()
  }
}
