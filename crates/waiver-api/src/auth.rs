//! HTTP Basic-auth extractor and the proxy-user capability check.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use waiver_core::store::WaiverStore;

use crate::{
  AppState,
  config::{AuthMethod, ServerConfig},
  error::ApiError,
};

/// The authenticated submitter of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
  pub username:  String,
  /// May record waivers on behalf of other users.
  pub can_proxy: bool,
}

impl Caller {
  pub fn new(username: impl Into<String>, config: &ServerConfig) -> Self {
    let username = username.into();
    let can_proxy = config.superusers.iter().any(|u| *u == username);
    Self { username, can_proxy }
  }

  /// Decide who a waiver is recorded for and who proxied it.
  ///
  /// Returns `(username, proxied_by)`. Asking for someone else requires the
  /// proxy capability.
  pub fn waiver_identity(
    &self,
    requested: Option<String>,
  ) -> Result<(String, Option<String>), ApiError> {
    match requested {
      Some(other) if other != self.username => {
        if !self.can_proxy {
          return Err(ApiError::Forbidden(format!(
            "user {} does not have the proxyuser ability",
            self.username
          )));
        }
        Ok((other, Some(self.username.clone())))
      }
      _ => Ok((self.username.clone(), None)),
    }
  }
}

/// Verify credentials directly from headers and return the username.
pub fn authenticate(headers: &HeaderMap, config: &ServerConfig) -> Result<String, ApiError> {
  let header_val = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(ApiError::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| ApiError::Unauthorized)?;
  let creds   = std::str::from_utf8(&decoded).map_err(|_| ApiError::Unauthorized)?;

  let (username, password) = creds.split_once(':').unwrap_or((creds, ""));
  if username.is_empty() {
    return Err(ApiError::Unauthorized);
  }

  if config.auth_method == AuthMethod::Dummy {
    return Ok(username.to_owned());
  }

  let user = config
    .users
    .iter()
    .find(|u| u.username == username)
    .ok_or(ApiError::Unauthorized)?;

  let parsed_hash = PasswordHash::new(&user.password_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Ok(username.to_owned())
}

impl<S> FromRequestParts<AppState<S>> for Caller
where
  S: WaiverStore + Clone + Send + Sync + 'static,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let username = authenticate(&parts.headers, &state.config)?;
    Ok(Caller::new(username, &state.config))
  }
}
