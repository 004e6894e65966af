//! Waiver service binary.
//!
//! Reads `config.toml` (or the path given with `--config`) and `WAIVER_*`
//! environment variables, opens the SQLite waiver store, and serves the JSON
//! API over HTTP.
//!
//! # Password hash generation
//!
//! To generate the argon2 PHC string for a `[[users]]` entry:
//!
//! ```text
//! cargo run -p waiver-server -- --hash-password
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use waiver_api::{AppState, ServerConfig, resultsdb::ResultsdbClient};
use waiver_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Waiver record-keeping service")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print the argon2 hash for a password entered on stdin and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if cli.hash_password {
    let password = read_password()?;
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let server_cfg = load_config(&cli.config)?;
  let store_path = expand_tilde(&server_cfg.store_path);

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  if server_cfg.resultsdb_api_url.is_none() {
    tracing::warn!("resultsdb_api_url is not set; waivers by result_id will be refused");
  }
  let results = ResultsdbClient::new(
    server_cfg.resultsdb_api_url.clone(),
    Duration::from_secs(server_cfg.resultsdb_timeout_secs),
  )
  .context("failed to build ResultsDB client")?;

  let address = format!("{}:{}", server_cfg.host, server_cfg.port);
  tracing::info!(
    auth_method = ?server_cfg.auth_method,
    store = %store_path.display(),
    "starting waiver service"
  );

  let state = AppState {
    store:   Arc::new(store),
    config:  Arc::new(server_cfg),
    results: Arc::new(results),
  };
  let app = waiver_api::router(state);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<ServerConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix("WAIVER")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("superusers"),
    )
    .build()
    .context("failed to read config file")?;

  settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
