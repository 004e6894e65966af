//! Runtime server configuration, deserialised from `config.toml` and
//! `WAIVER_*` environment variables.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How callers submitting waivers are identified.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
  /// HTTP Basic, verified against the argon2 hashes in [`ServerConfig::users`].
  #[default]
  Basic,
  /// HTTP Basic username taken at face value. Development only.
  Dummy,
}

/// A user allowed to authenticate with [`AuthMethod::Basic`].
#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                   String,
  #[serde(default = "default_port")]
  pub port:                   u16,
  /// Scheme and authority used for pagination links, e.g.
  /// `https://waivers.example.com`.
  pub base_url:               String,
  pub store_path:             PathBuf,
  #[serde(default)]
  pub auth_method:            AuthMethod,
  #[serde(default)]
  pub users:                  Vec<UserConfig>,
  /// Users allowed to submit waivers on behalf of someone else.
  #[serde(default)]
  pub superusers:             Vec<String>,
  /// Base URL of the ResultsDB API used to resolve legacy `result_id`s.
  pub resultsdb_api_url:      Option<String>,
  #[serde(default = "default_resultsdb_timeout_secs")]
  pub resultsdb_timeout_secs: u64,
  /// Origin allowed by CORS; CORS headers are omitted when unset.
  pub cors_url:               Option<String>,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 5004 }

fn default_resultsdb_timeout_secs() -> u64 { 10 }
