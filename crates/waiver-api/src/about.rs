//! Service-level endpoints: version info, health check and the 404 fallback.

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use serde_json::{Value, json};
use waiver_core::store::WaiverStore;

use crate::{AppState, error::ApiError};

/// `GET /api/v1.0/about`
pub async fn about<S>(State(state): State<AppState<S>>) -> Json<Value>
where
  S: WaiverStore,
{
  Json(json!({
    "version":     env!("CARGO_PKG_VERSION"),
    "auth_method": state.config.auth_method,
  }))
}

/// `GET /healthcheck`
pub async fn healthcheck<S>(State(state): State<AppState<S>>) -> impl IntoResponse
where
  S: WaiverStore,
{
  match state.store.health_check().await {
    Ok(()) => (StatusCode::OK, "Health check OK"),
    Err(e) => {
      tracing::error!(error = %e, "health check failed");
      (StatusCode::SERVICE_UNAVAILABLE, "Unable to communicate with database")
    }
  }
}

pub async fn not_found() -> ApiError { ApiError::NotFound }
