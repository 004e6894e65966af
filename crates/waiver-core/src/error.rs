//! Error types for `waiver-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("subject must be a JSON object with string values")]
  InvalidSubject,

  #[error("time data '{0}' does not match format '%Y-%m-%dT%H:%M:%S.%f'")]
  InvalidSince(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
