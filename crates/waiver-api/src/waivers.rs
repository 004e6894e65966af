//! Handlers for `/api/v1.0/waivers` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/waivers/` | Filters as query parameters, plus `page`; paginated |
//! | `GET`  | `/waivers/:id` | Single waiver |
//! | `POST` | `/waivers/` | One object or an array; returns 201 + the same shape |
//! | `POST` | `/waivers/+by-subjects-and-testcases` | Bulk lookup, unpaginated |

use axum::{
  Json,
  extract::{
    OriginalUri, Path, Query, State,
    rejection::{JsonRejection, QueryRejection},
  },
  http::StatusCode,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::form_urlencoded;
use waiver_core::{
  query::WaiverPage,
  store::WaiverStore,
  waiver::{NewWaiver, Waiver},
};

use crate::{
  AppState,
  auth::Caller,
  error::ApiError,
  request::{ListParams, Target, parse_bulk_lookup, parse_create_item},
  resultsdb::resolve_result,
};

// ─── List ────────────────────────────────────────────────────────────────────

/// A page of waivers with absolute navigation links.
#[derive(Debug, Serialize)]
pub struct WaiverCollection {
  pub data:  Vec<Waiver>,
  /// Omitted on the first page.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub prev:  Option<String>,
  /// Omitted on the last page.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub next:  Option<String>,
  pub first: String,
  pub last:  String,
}

/// `GET /waivers/?subject=...&testcase=...&since=...&page=N`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  OriginalUri(uri): OriginalUri,
  params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<WaiverCollection>, ApiError>
where
  S: WaiverStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
  let (filter, page) = params.parse()?;
  debug!(?filter, page = page.page, "listing waivers");

  let result = state
    .store
    .list_waivers(&filter, page)
    .await
    .map_err(ApiError::store)?;

  if result.page > result.pages() {
    return Err(ApiError::NotFound);
  }

  let links = Links { base_url: &state.config.base_url, path: uri.path(), params: &params };
  Ok(Json(links.collection(result)))
}

struct Links<'a> {
  base_url: &'a str,
  path:     &'a str,
  params:   &'a ListParams,
}

impl Links<'_> {
  /// `page` comes first, then every filter the caller supplied.
  fn page(&self, page: u32) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("page", &page.to_string());
    for (name, value) in self.params.filter_pairs() {
      query.append_pair(name, value);
    }
    format!("{}{}?{}", self.base_url.trim_end_matches('/'), self.path, query.finish())
  }

  fn collection(&self, result: WaiverPage) -> WaiverCollection {
    WaiverCollection {
      prev:  result.has_prev().then(|| self.page(result.page - 1)),
      next:  result.has_next().then(|| self.page(result.page + 1)),
      first: self.page(1),
      last:  self.page(result.pages()),
      data:  result.items,
    }
  }
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /waivers/:id`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<String>,
) -> Result<Json<Waiver>, ApiError>
where
  S: WaiverStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let id: i64 = id.parse().map_err(|_| ApiError::NotFound)?;
  state
    .store
    .get_waiver(id)
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .ok_or(ApiError::NotFound)
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// Mirrors the shape of the request body.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Created {
  One(Waiver),
  Many(Vec<Waiver>),
}

/// `POST /waivers/`
///
/// Every item is validated, authorised and resolved before anything is
/// written; the batch is then stored in one transaction.
pub async fn create<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
  body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Created>), ApiError>
where
  S: WaiverStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
  let (items, single) = match body {
    Value::Array(items) => (items, false),
    other => (vec![other], true),
  };

  let mut inputs = Vec::with_capacity(items.len());
  for item in &items {
    inputs.push(prepare(&state, &caller, item).await?);
  }

  let mut created = state
    .store
    .create_waivers(inputs)
    .await
    .map_err(ApiError::store)?;

  for waiver in &created {
    info!(
      id = waiver.id,
      username = %waiver.username,
      proxied_by = ?waiver.proxied_by,
      testcase = %waiver.testcase,
      waived = waiver.waived,
      "created waiver"
    );
  }

  let body = if single {
    created
      .pop()
      .map(Created::One)
      .ok_or_else(|| ApiError::Store("store returned no waiver".into()))?
  } else {
    Created::Many(created)
  };
  Ok((StatusCode::CREATED, Json(body)))
}

async fn prepare<S: WaiverStore>(
  state: &AppState<S>,
  caller: &Caller,
  item: &Value,
) -> Result<NewWaiver, ApiError> {
  let parsed = parse_create_item(item)?;
  let (username, proxied_by) = caller.waiver_identity(parsed.username)?;

  let (subject, testcase) = match parsed.target {
    Target::Direct { subject, testcase } => (subject, testcase),
    Target::Result(result_id) => resolve_result(state.results.as_ref(), result_id)
      .await
      .map_err(|e| {
        warn!(result_id, error = %e, "result lookup failed");
        ApiError::from(e)
      })?,
  };

  Ok(NewWaiver {
    subject,
    testcase,
    product_version: parsed.product_version,
    username,
    proxied_by,
    waived: parsed.waived,
    comment: Some(parsed.comment),
  })
}

// ─── Bulk lookup ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct WaiverList {
  pub data: Vec<Waiver>,
}

/// `POST /waivers/+by-subjects-and-testcases`
pub async fn by_subjects_and_testcases<S>(
  State(state): State<AppState<S>>,
  body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<WaiverList>, ApiError>
where
  S: WaiverStore,
  S::Error: std::error::Error + Send + Sync + 'static,
{
  let body = match body {
    Ok(Json(body)) => body,
    Err(JsonRejection::MissingJsonContentType(_)) => Value::Null,
    Err(e) => return Err(ApiError::BadRequest(e.body_text())),
  };
  let (results, filter) = parse_bulk_lookup(&body)?;
  debug!(refs = results.len(), ?filter, "bulk waiver lookup");

  let data = state
    .store
    .find_by_results(&results, &filter)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(WaiverList { data }))
}
