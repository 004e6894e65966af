//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error body has the shape `{"message": ...}`, where the message is a
//! string or, for per-field validation failures, a map of field to message.

use std::collections::BTreeMap;

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::resultsdb::LookupError;

/// Body of every 404, whether for an unknown waiver or an unknown route.
pub const NOT_FOUND_MESSAGE: &str = "The requested URL was not found on the \
   server.  If you entered the URL manually please check your spelling and \
   try again.";

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("invalid fields: {0:?}")]
  InvalidFields(BTreeMap<String, String>),

  #[error("unauthorized")]
  Unauthorized,

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("not found")]
  NotFound,

  /// The legacy result lookup failed; `status` is passed through.
  #[error("Failed looking up result in Resultsdb: {message}")]
  Upstream { status: StatusCode, message: String },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Report a single invalid field.
  pub fn field(name: &str, message: impl Into<String>) -> Self {
    Self::InvalidFields(BTreeMap::from([(name.to_owned(), message.into())]))
  }

  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}

impl From<LookupError> for ApiError {
  fn from(e: LookupError) -> Self {
    let status = match &e {
      LookupError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
      LookupError::Status { status, .. } => {
        StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
      }
      LookupError::NoSubject(_) => StatusCode::BAD_REQUEST,
      LookupError::Transport(_) => StatusCode::BAD_GATEWAY,
    };
    ApiError::Upstream { status, message: e.to_string() }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, json!(m)),
      ApiError::InvalidFields(fields) => (StatusCode::BAD_REQUEST, json!(fields)),
      ApiError::Unauthorized => {
        let mut res = (
          StatusCode::UNAUTHORIZED,
          Json(json!({ "message": "Authentication required" })),
        )
          .into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"waivers\""),
        );
        return res;
      }
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, json!(m)),
      ApiError::NotFound => (StatusCode::NOT_FOUND, json!(NOT_FOUND_MESSAGE)),
      ApiError::Upstream { status, .. } => (*status, json!(self.to_string())),
      ApiError::Store(e) => {
        // Internal details stay in the log.
        tracing::error!(error = %e, "internal error");
        (StatusCode::INTERNAL_SERVER_ERROR, json!(""))
      }
    };
    (status, Json(json!({ "message": message }))).into_response()
  }
}
