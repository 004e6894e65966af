//! JSON REST API for the waiver service.
//!
//! Exposes an axum [`Router`] backed by any [`WaiverStore`]. Legacy
//! `result_id` submissions are resolved through a [`ResultLookup`].
//!
//! # Routes
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `GET`  | `/api/v1.0/waivers/` | [`waivers::list`] |
//! | `POST` | `/api/v1.0/waivers/` | [`waivers::create`] |
//! | `GET`  | `/api/v1.0/waivers/{id}` | [`waivers::get_one`] |
//! | `POST` | `/api/v1.0/waivers/+by-subjects-and-testcases` | [`waivers::by_subjects_and_testcases`] |
//! | `GET`  | `/api/v1.0/about` | [`about::about`] |
//! | `GET`  | `/healthcheck` | [`about::healthcheck`] |

pub mod about;
pub mod auth;
pub mod config;
pub mod error;
pub mod request;
pub mod resultsdb;
pub mod waivers;

#[cfg(test)]
mod tests;

use std::{any::Any, sync::Arc};

use axum::{
  Router,
  http::{HeaderValue, Method, header},
  response::{IntoResponse, Response},
  routing::{get, post},
};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use waiver_core::store::WaiverStore;

pub use config::ServerConfig;
pub use error::ApiError;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: WaiverStore> {
  pub store:   Arc<S>,
  pub config:  Arc<ServerConfig>,
  pub results: Arc<dyn resultsdb::ResultLookup>,
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the service router for `state`.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: WaiverStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let cors = state.config.cors_url.as_deref().and_then(cors_layer);

  let router = Router::new()
    // Waivers
    .route("/api/v1.0/waivers/", get(waivers::list::<S>).post(waivers::create::<S>))
    .route("/api/v1.0/waivers", get(waivers::list::<S>).post(waivers::create::<S>))
    .route(
      "/api/v1.0/waivers/+by-subjects-and-testcases",
      post(waivers::by_subjects_and_testcases::<S>),
    )
    .route("/api/v1.0/waivers/{id}", get(waivers::get_one::<S>))
    // Service
    .route("/api/v1.0/about", get(about::about::<S>))
    .route("/healthcheck", get(about::healthcheck::<S>))
    .fallback(about::not_found)
    .layer(CatchPanicLayer::custom(panic_response))
    .layer(TraceLayer::new_for_http())
    .with_state(state);

  match cors {
    Some(cors) => router.layer(cors),
    None => router,
  }
}

/// A panicking handler answers like any other internal error.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
  let detail = panic
    .downcast_ref::<&str>()
    .map(|s| (*s).to_owned())
    .or_else(|| panic.downcast_ref::<String>().cloned())
    .unwrap_or_else(|| "unknown panic".to_owned());
  ApiError::Store(format!("handler panicked: {detail}").into()).into_response()
}

fn cors_layer(origin: &str) -> Option<CorsLayer> {
  match HeaderValue::from_str(origin) {
    Ok(origin) => Some(
      CorsLayer::new()
        .allow_origin(origin)
        .allow_headers([header::CONTENT_TYPE])
        .allow_methods([Method::POST, Method::OPTIONS]),
    ),
    Err(e) => {
      tracing::warn!(%origin, error = %e, "ignoring unusable cors_url");
      None
    }
  }
}
