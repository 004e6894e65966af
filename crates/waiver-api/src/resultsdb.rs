//! Lookup of legacy `result_id`s in ResultsDB.
//!
//! Old clients submit a waiver for a numeric ResultsDB result instead of a
//! subject/testcase pair. The result is fetched and its subject and testcase
//! name are used in its place. The lookup never touches the waiver store.

use std::{collections::BTreeMap, future::Future, pin::Pin, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use waiver_core::subject::Subject;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum LookupError {
  #[error("no ResultsDB API URL is configured")]
  NotConfigured,

  #[error("{status} response for {url}")]
  Status { status: u16, url: String },

  #[error("result {0} has no data to derive a subject from")]
  NoSubject(i64),

  #[error("{0}")]
  Transport(#[from] reqwest::Error),
}

// ─── Result record ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct TestcaseRef {
  pub name: String,
}

/// The parts of a ResultsDB result a waiver needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultRecord {
  /// ResultsDB stores every extra-data value as a list of strings.
  #[serde(default)]
  pub data:     BTreeMap<String, Vec<String>>,
  pub testcase: TestcaseRef,
}

impl ResultRecord {
  /// Derive a waiver subject from the result's extra data.
  ///
  /// `original_spec_nvr` wins when present; otherwise the result must carry
  /// both `type` and `item`.
  pub fn subject(&self) -> Option<Subject> {
    let first = |key: &str| self.data.get(key).and_then(|v| v.first());

    if let Some(nvr) = first("original_spec_nvr") {
      return Some(Subject::new().with("original_spec_nvr", nvr.as_str()));
    }
    match (first("type"), first("item")) {
      (Some(kind), Some(item)) => {
        Some(Subject::new().with("type", kind.as_str()).with("item", item.as_str()))
      }
      _ => None,
    }
  }
}

// ─── Lookup trait ────────────────────────────────────────────────────────────

/// Resolves a result id into a [`ResultRecord`].
pub trait ResultLookup: Send + Sync {
  fn get_result(&self, result_id: i64) -> BoxFuture<'_, Result<ResultRecord, LookupError>>;
}

/// Resolve `result_id` into the (subject, testcase) a waiver should carry.
pub async fn resolve_result(
  lookup: &dyn ResultLookup,
  result_id: i64,
) -> Result<(Subject, String), LookupError> {
  let record = lookup.get_result(result_id).await?;
  let subject = record.subject().ok_or(LookupError::NoSubject(result_id))?;
  Ok((subject, record.testcase.name))
}

// ─── HTTP client ─────────────────────────────────────────────────────────────

/// [`ResultLookup`] backed by the ResultsDB REST API.
pub struct ResultsdbClient {
  http:     reqwest::Client,
  base_url: Option<String>,
}

impl ResultsdbClient {
  /// `base_url` is the API root, e.g. `https://resultsdb/api/v2.0`. Without
  /// one every lookup fails with [`LookupError::NotConfigured`].
  pub fn new(base_url: Option<String>, timeout: Duration) -> reqwest::Result<Self> {
    let http = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { http, base_url })
  }
}

impl ResultLookup for ResultsdbClient {
  fn get_result(&self, result_id: i64) -> BoxFuture<'_, Result<ResultRecord, LookupError>> {
    Box::pin(async move {
      let base = self.base_url.as_deref().ok_or(LookupError::NotConfigured)?;
      let url = format!("{}/results/{result_id}", base.trim_end_matches('/'));

      tracing::debug!(%url, "looking up result");
      let response = self.http.get(&url).send().await?;
      let status = response.status();
      if !status.is_success() {
        return Err(LookupError::Status { status: status.as_u16(), url });
      }
      Ok(response.json::<ResultRecord>().await?)
    })
  }
}
