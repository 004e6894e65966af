use std::{collections::HashMap, path::PathBuf, sync::Arc};

use axum::{
  body::{Body, to_bytes},
  http::{Request, StatusCode, header},
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tower::ServiceExt as _;
use url::form_urlencoded;
use waiver_core::{store::WaiverStore, subject::Subject, waiver::NewWaiver};
use waiver_store_sqlite::SqliteStore;

use super::*;
use crate::{
  config::AuthMethod,
  error::NOT_FOUND_MESSAGE,
  resultsdb::{BoxFuture, LookupError, ResultLookup, ResultRecord},
};

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// Serves canned results; unknown ids answer 404 like ResultsDB does.
#[derive(Default)]
struct StubLookup {
  records: HashMap<i64, ResultRecord>,
}

impl StubLookup {
  fn with(mut self, id: i64, record: Value) -> Self {
    self.records.insert(id, serde_json::from_value(record).unwrap());
    self
  }
}

impl ResultLookup for StubLookup {
  fn get_result(&self, result_id: i64) -> BoxFuture<'_, Result<ResultRecord, LookupError>> {
    let found = self.records.get(&result_id).cloned();
    Box::pin(async move {
      found.ok_or(LookupError::Status {
        status: 404,
        url:    format!("http://resultsdb/api/v2.0/results/{result_id}"),
      })
    })
  }
}

/// Fails the way a buggy lookup would: by panicking mid-request.
struct PanickingLookup;

impl ResultLookup for PanickingLookup {
  fn get_result(&self, result_id: i64) -> BoxFuture<'_, Result<ResultRecord, LookupError>> {
    panic!("lookup of result {result_id} exploded")
  }
}

fn server_config(cors_url: Option<&str>) -> ServerConfig {
  ServerConfig {
    host:                   "127.0.0.1".to_string(),
    port:                   5004,
    base_url:               "http://localhost".to_string(),
    store_path:             PathBuf::from(":memory:"),
    auth_method:            AuthMethod::Dummy,
    users:                  vec![],
    superusers:             vec!["bodhi".to_string()],
    resultsdb_api_url:      None,
    resultsdb_timeout_secs: 10,
    cors_url:               cors_url.map(str::to_owned),
  }
}

async fn make_state_with(lookup: StubLookup, cors_url: Option<&str>) -> AppState<SqliteStore> {
  AppState {
    store:   Arc::new(SqliteStore::open_in_memory().await.unwrap()),
    config:  Arc::new(server_config(cors_url)),
    results: Arc::new(lookup),
  }
}

async fn make_state() -> AppState<SqliteStore> {
  make_state_with(StubLookup::default(), None).await
}

fn auth_header(user: &str) -> String {
  format!("Basic {}", B64.encode(format!("{user}:")))
}

async fn send(
  state: &AppState<SqliteStore>,
  method: &str,
  uri: &str,
  headers: Vec<(header::HeaderName, &str)>,
  body: Option<Value>,
) -> (StatusCode, axum::http::HeaderMap, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  for (k, v) in headers {
    builder = builder.header(k, v);
  }
  let body = match body {
    Some(json) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(json.to_string())
    }
    None => Body::empty(),
  };

  let resp = router(state.clone()).oneshot(builder.body(body).unwrap()).await.unwrap();
  let status = resp.status();
  let headers = resp.headers().clone();
  let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let value = serde_json::from_slice(&bytes)
    .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
  (status, headers, value)
}

async fn get(state: &AppState<SqliteStore>, uri: &str) -> (StatusCode, Value) {
  let (status, _, body) = send(state, "GET", uri, vec![], None).await;
  (status, body)
}

async fn post_as(
  state: &AppState<SqliteStore>,
  user: &str,
  uri: &str,
  body: Value,
) -> (StatusCode, Value) {
  let auth = auth_header(user);
  let (status, _, body) =
    send(state, "POST", uri, vec![(header::AUTHORIZATION, auth.as_str())], Some(body)).await;
  (status, body)
}

async fn post(state: &AppState<SqliteStore>, uri: &str, body: Value) -> (StatusCode, Value) {
  let (status, _, body) = send(state, "POST", uri, vec![], Some(body)).await;
  (status, body)
}

fn koji_build(item: &str) -> Subject {
  Subject::new().with("type", "koji_build").with("item", item)
}

async fn seed(state: &AppState<SqliteStore>, inputs: Vec<NewWaiver>) -> Vec<i64> {
  state
    .store
    .create_waivers(inputs)
    .await
    .unwrap()
    .into_iter()
    .map(|w| w.id)
    .collect()
}

/// `n` waivers with pairwise distinct keys, like a busy day of gating.
async fn seed_distinct(state: &AppState<SqliteStore>, n: usize) -> Vec<i64> {
  let inputs = (0..n)
    .map(|i| {
      let mut w = NewWaiver::new(
        koji_build(&i.to_string()),
        format!("case {i}"),
        format!("foo-{i}"),
        format!("foo {i}"),
      );
      w.comment = Some("bla bla bla".into());
      w
    })
    .collect();
  seed(state, inputs).await
}

fn subject_query(subject: &Value) -> String {
  form_urlencoded::byte_serialize(subject.to_string().as_bytes()).collect()
}

fn ids(body: &Value) -> Vec<i64> {
  body["data"].as_array().unwrap().iter().map(|w| w["id"].as_i64().unwrap()).collect()
}

fn glibc_waiver() -> Value {
  json!({
    "subject": {"type": "koji_build", "item": "glibc-2.26-27.fc27"},
    "testcase": "testcase1",
    "product_version": "fool-1",
    "waived": true,
    "comment": "it broke",
  })
}

const WAIVERS: &str = "/api/v1.0/waivers/";
const BULK: &str = "/api/v1.0/waivers/+by-subjects-and-testcases";

// ─── Create ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_waiver() {
  let state = make_state().await;
  let (status, body) = post_as(&state, "foo", WAIVERS, glibc_waiver()).await;

  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["username"], "foo");
  assert_eq!(body["subject"], json!({"type": "koji_build", "item": "glibc-2.26-27.fc27"}));
  assert_eq!(body["testcase"], "testcase1");
  assert_eq!(body["product_version"], "fool-1");
  assert_eq!(body["waived"], true);
  assert_eq!(body["comment"], "it broke");
  assert_eq!(body["proxied_by"], Value::Null);
  assert!(body["id"].is_i64());
  assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn create_requires_credentials() {
  let state = make_state().await;
  let (status, _) = post(&state, WAIVERS, glibc_waiver()).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(state.store.count_waivers().await.unwrap(), 0);
}

#[tokio::test]
async fn create_waiver_legacy_result_id() {
  let lookup = StubLookup::default().with(
    123,
    json!({
      "data": {"type": ["koji_build"], "item": ["somebuild"]},
      "testcase": {"name": "sometest"},
    }),
  );
  let state = make_state_with(lookup, None).await;
  let (status, body) = post_as(
    &state,
    "foo",
    WAIVERS,
    json!({"result_id": 123, "product_version": "fool-1", "waived": true, "comment": "it broke"}),
  )
  .await;

  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["subject"], json!({"type": "koji_build", "item": "somebuild"}));
  assert_eq!(body["testcase"], "sometest");
  assert_eq!(body["username"], "foo");
}

#[tokio::test]
async fn create_waiver_with_original_spec_nvr_subject() {
  let lookup = StubLookup::default().with(
    123,
    json!({
      "data": {"original_spec_nvr": ["somedata"]},
      "testcase": {"name": "sometest"},
    }),
  );
  let state = make_state_with(lookup, None).await;
  let (status, body) = post_as(
    &state,
    "foo",
    WAIVERS,
    json!({"result_id": 123, "product_version": "fool-1", "waived": true, "comment": "it broke"}),
  )
  .await;

  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["subject"], json!({"original_spec_nvr": "somedata"}));
  assert_eq!(body["testcase"], "sometest");
}

#[tokio::test]
async fn create_waiver_without_comment() {
  let state = make_state().await;
  let (status, body) = post_as(
    &state,
    "foo",
    WAIVERS,
    json!({"result_id": 123, "product_version": "fool-1", "waived": true}),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["message"], "Comment is a required argument.");
}

#[tokio::test]
async fn create_waiver_with_unknown_result_id() {
  let state = make_state().await;
  let (status, body) = post_as(
    &state,
    "foo",
    WAIVERS,
    json!({"result_id": 123, "product_version": "fool-1", "waived": true, "comment": "it broke"}),
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert!(
    body["message"].as_str().unwrap().starts_with("Failed looking up result in Resultsdb:")
  );
  assert_eq!(state.store.count_waivers().await.unwrap(), 0);
}

#[tokio::test]
async fn create_waiver_with_no_testcase() {
  let state = make_state().await;
  let (status, body) = post_as(
    &state,
    "foo",
    WAIVERS,
    json!({
      "subject": {"type": "koji_build", "item": "glibc-2.26-27.fc27"},
      "waived": true,
      "product_version": "the-best",
    }),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["message"], "Either result_id or subject/testcase are required arguments.");
}

#[tokio::test]
async fn create_waiver_with_malformed_subject() {
  let state = make_state().await;
  let (status, body) =
    post_as(&state, "foo", WAIVERS, json!({"subject": "asd", "testcase": "qqq"})).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["message"]["subject"], "Must be a valid dict");
}

#[tokio::test]
async fn non_superuser_cannot_create_waiver_for_other_users() {
  let state = make_state().await;
  let mut waiver = glibc_waiver();
  waiver["username"] = json!("bar");

  let (status, body) = post_as(&state, "foo", WAIVERS, waiver).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(body["message"], "user foo does not have the proxyuser ability");
  assert_eq!(state.store.count_waivers().await.unwrap(), 0);
}

#[tokio::test]
async fn superuser_can_create_waiver_for_other_users() {
  let state = make_state().await;
  let mut waiver = glibc_waiver();
  waiver["username"] = json!("bar");

  let (status, body) = post_as(&state, "bodhi", WAIVERS, waiver).await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(body["username"], "bar");
  assert_eq!(body["proxied_by"], "bodhi");
}

#[tokio::test]
async fn create_multiple_waivers() {
  let state = make_state().await;
  let item1 = glibc_waiver();
  let item2 = json!({
    "subject": {"type": "koji_build", "item": "kernel-4.15.17-300.fc27"},
    "testcase": "testcase2",
    "product_version": "fool-2",
    "waived": false,
    "comment": "fixed",
  });

  let (status, body) =
    post_as(&state, "foo", WAIVERS, json!([item1.clone(), item2.clone()])).await;
  assert_eq!(status, StatusCode::CREATED);

  let created = body.as_array().unwrap();
  assert_eq!(created.len(), 2);
  for (actual, expected) in created.iter().zip([&item1, &item2]) {
    for (key, value) in expected.as_object().unwrap() {
      assert_eq!(&actual[key], value, "field {key}");
    }
  }
  assert!(created[0]["id"].as_i64() < created[1]["id"].as_i64());
  assert_eq!(state.store.count_waivers().await.unwrap(), 2);
}

#[tokio::test]
async fn create_multiple_waivers_rollback_on_error() {
  let state = make_state().await;
  let (status, _) = post_as(&state, "foo", WAIVERS, json!([glibc_waiver(), {}])).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(state.store.count_waivers().await.unwrap(), 0);
}

#[tokio::test]
async fn batch_with_forbidden_item_stores_nothing() {
  let state = make_state().await;
  let mut other = glibc_waiver();
  other["username"] = json!("bar");

  let (status, _) = post_as(&state, "foo", WAIVERS, json!([glibc_waiver(), other])).await;
  assert_eq!(status, StatusCode::FORBIDDEN);
  assert_eq!(state.store.count_waivers().await.unwrap(), 0);
}

#[tokio::test]
async fn unwaive_supersedes_through_the_api() {
  let state = make_state().await;
  let (_, first) = post_as(&state, "foo", WAIVERS, glibc_waiver()).await;
  let mut unwaive = glibc_waiver();
  unwaive["waived"] = json!(false);
  let (_, second) = post_as(&state, "foo", WAIVERS, unwaive).await;

  let (_, body) = get(&state, WAIVERS).await;
  assert_eq!(ids(&body), vec![second["id"].as_i64().unwrap()]);
  assert_eq!(body["data"][0]["waived"], false);

  let (_, body) = get(&state, "/api/v1.0/waivers/?include_obsolete=1").await;
  assert_eq!(
    ids(&body),
    vec![second["id"].as_i64().unwrap(), first["id"].as_i64().unwrap()]
  );
}

// ─── Get one ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn get_waiver() {
  let state = make_state().await;
  let mut input = NewWaiver::new(koji_build("glibc-2.26-27.fc27"), "testcase1", "foo-1", "foo");
  input.comment = Some("bla bla bla".into());
  let id = seed(&state, vec![input]).await[0];

  let (status, body) = get(&state, &format!("/api/v1.0/waivers/{id}")).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["id"], id);
  assert_eq!(body["username"], "foo");
  assert_eq!(body["subject"], json!({"type": "koji_build", "item": "glibc-2.26-27.fc27"}));
  assert_eq!(body["testcase"], "testcase1");
  assert_eq!(body["product_version"], "foo-1");
  assert_eq!(body["waived"], true);
  assert_eq!(body["comment"], "bla bla bla");
}

#[tokio::test]
async fn not_found_for_nonexistent_waiver() {
  let state = make_state().await;
  for uri in ["/api/v1.0/waivers/foo", "/api/v1.0/waivers/999", "/api/v1.0/nope"] {
    let (status, body) = get(&state, uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    assert_eq!(body["message"], NOT_FOUND_MESSAGE);
  }
}

// ─── List ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn get_waivers() {
  let state = make_state().await;
  seed_distinct(&state, 10).await;
  let (status, body) = get(&state, WAIVERS).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["data"].as_array().unwrap().len(), 10);
  let links = body.as_object().unwrap();
  assert!(!links.contains_key("prev"));
  assert!(!links.contains_key("next"));
  assert_eq!(body["first"], "http://localhost/api/v1.0/waivers/?page=1");
  assert_eq!(body["last"], "http://localhost/api/v1.0/waivers/?page=1");
}

#[tokio::test]
async fn pagination_waivers() {
  let state = make_state().await;
  let mut seeded = seed_distinct(&state, 30).await;
  seeded.reverse();

  let (status, body) = get(&state, "/api/v1.0/waivers/?page=2").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(ids(&body), seeded[10..20].to_vec());
  assert_eq!(body["prev"], "http://localhost/api/v1.0/waivers/?page=1");
  assert_eq!(body["next"], "http://localhost/api/v1.0/waivers/?page=3");
  assert_eq!(body["first"], "http://localhost/api/v1.0/waivers/?page=1");
  assert_eq!(body["last"], "http://localhost/api/v1.0/waivers/?page=3");
}

#[tokio::test]
async fn pagination_links_carry_filters() {
  let state = make_state().await;
  seed_distinct(&state, 3).await;

  let (status, body) =
    get(&state, "/api/v1.0/waivers/?include_obsolete=1&testcase=case+1&page=1").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(
    body["first"],
    "http://localhost/api/v1.0/waivers/?page=1&testcase=case+1&include_obsolete=1"
  );
}

#[tokio::test]
async fn page_past_the_end_is_not_found() {
  let state = make_state().await;
  seed_distinct(&state, 3).await;
  let (status, _) = get(&state, "/api/v1.0/waivers/?page=2").await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (status, body) = get(&state, "/api/v1.0/waivers/?page=0").await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["message"]["page"].is_string());
}

#[tokio::test]
async fn obsolete_waivers_are_excluded_by_default() {
  let state = make_state().await;
  let old = NewWaiver::new(koji_build("glibc-2.26-27.fc27"), "testcase1", "foo-1", "foo");
  let mut new = old.clone();
  new.waived = false;
  let ids_seeded = seed(&state, vec![old, new]).await;

  let (_, body) = get(&state, WAIVERS).await;
  assert_eq!(ids(&body), vec![ids_seeded[1]]);
  assert_eq!(body["data"][0]["waived"], false);

  let (_, body) = get(&state, "/api/v1.0/waivers/?include_obsolete=1").await;
  assert_eq!(ids(&body), vec![ids_seeded[1], ids_seeded[0]]);
}

#[tokio::test]
async fn obsolete_requires_the_same_product_version_and_username() {
  let state = make_state().await;
  let base = NewWaiver::new(koji_build("glibc-2.26-27.fc27"), "testcase1", "foo-1", "foo");
  let mut other_version = base.clone();
  other_version.product_version = "foo-2".into();
  let mut other_user = base.clone();
  other_user.username = "bar".into();
  seed(&state, vec![base, other_version, other_user]).await;

  let (_, body) = get(&state, "/api/v1.0/waivers/?include_obsolete=0").await;
  assert_eq!(body["data"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn filtering_waivers_by_each_field() {
  let state = make_state().await;
  let glibc = NewWaiver::new(koji_build("glibc-2.26-27.fc27"), "testcase1", "release-1", "foo");
  let mut kernel =
    NewWaiver::new(koji_build("kernel-4.15.17-300.fc27"), "testcase2", "release-2", "bar");
  kernel.proxied_by = Some("bodhi".into());
  seed(&state, vec![glibc, kernel]).await;

  let subject = subject_query(&json!({"type": "koji_build", "item": "glibc-2.26-27.fc27"}));
  let cases = [
    (format!("subject={subject}"), "testcase1"),
    ("testcase=testcase1".to_owned(), "testcase1"),
    ("product_version=release-2".to_owned(), "testcase2"),
    ("username=foo".to_owned(), "testcase1"),
    ("proxied_by=bodhi".to_owned(), "testcase2"),
  ];
  for (query, testcase) in cases {
    let (status, body) = get(&state, &format!("{WAIVERS}?{query}")).await;
    assert_eq!(status, StatusCode::OK, "{query}");
    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 1, "{query}");
    assert_eq!(data[0]["testcase"], testcase, "{query}");
  }
}

#[tokio::test]
async fn filtering_waivers_with_invalid_json_subject() {
  let state = make_state().await;
  let (status, body) = get(&state, "/api/v1.0/waivers/?subject=%5B").await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["message"]["subject"].as_str().unwrap().starts_with("Invalid JSON: "));
}

#[tokio::test]
async fn filtering_waivers_by_since() {
  let state = make_state().await;
  seed(
    &state,
    vec![NewWaiver::new(koji_build("glibc-2.26-27.fc27"), "testcase1", "foo-1", "foo")],
  )
  .await;

  let iso = |offset: i64| {
    (Utc::now() + Duration::seconds(offset)).naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
  };
  let (before1, before2, after) = (iso(-100), iso(-99), iso(100));

  let cases = [
    (before1.clone(), 1),
    (format!("{before1},{after}"), 1),
    (after.clone(), 0),
    (format!("{before1},{before2}"), 0),
  ];
  for (since, expected) in cases {
    let (status, body) = get(&state, &format!("{WAIVERS}?since={since}")).await;
    assert_eq!(status, StatusCode::OK, "{since}");
    assert_eq!(body["data"].as_array().unwrap().len(), expected, "{since}");
  }
}

#[tokio::test]
async fn filtering_waivers_by_malformed_since() {
  let state = make_state().await;
  let now = Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
  let cases = [
    ("123".to_owned(), "123"),
    (format!("{now},badend"), "badend"),
    (format!("{now},too,many,commas"), "too,many,commas"),
  ];
  for (since, literal) in cases {
    let (status, body) = get(&state, &format!("{WAIVERS}?since={since}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
      body["message"]["since"],
      format!("time data '{literal}' does not match format '%Y-%m-%dT%H:%M:%S.%f'")
    );
  }
}

// ─── Bulk lookup ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn get_waivers_with_post_request() {
  let state = make_state().await;
  let inputs = (1..=50)
    .map(|i| {
      NewWaiver::new(koji_build(&i.to_string()), format!("case {i}"), format!("foo-{i}"), format!("foo {i}"))
    })
    .collect();
  seed(&state, inputs).await;

  let results: Vec<Value> = (1..=50)
    .map(|i| json!({"subject": {"type": "koji_build", "item": i.to_string()}, "testcase": format!("case {i}")}))
    .collect();
  let (status, body) = post(&state, BULK, json!({ "results": results })).await;
  assert_eq!(status, StatusCode::OK);

  let data = body["data"].as_array().unwrap();
  assert_eq!(data.len(), 50);
  let subjects: Vec<&Value> = data.iter().map(|w| &w["subject"]).collect();
  let expected: Vec<Value> =
    (1..=50).rev().map(|i| json!({"type": "koji_build", "item": i.to_string()})).collect();
  assert_eq!(subjects, expected.iter().collect::<Vec<_>>());
  assert!(data.iter().all(|w| w["username"].as_str().unwrap().starts_with("foo")));
}

#[tokio::test]
async fn filtering_waivers_with_bad_key() {
  let state = make_state().await;
  for results in [
    json!([{"item": {"subject.test1": "subject1"}}]),
    json!([{"subject": "subject1"}]),
  ] {
    let (status, body) = post(&state, BULK, json!({ "results": results })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
      body["message"],
      "'results' parameter should be a list of dictionaries with subject and testcase"
    );
  }
}

#[tokio::test]
async fn filtering_waivers_with_empty_results() {
  let state = make_state().await;
  seed(
    &state,
    vec![NewWaiver::new(koji_build("glibc-2.26-27.fc27"), "testcase1", "foo-1", "foo-1")],
  )
  .await;

  for results in [json!([]), json!([{}])] {
    let (status, body) = post(&state, BULK, json!({ "results": results })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
  }
}

#[tokio::test]
async fn get_waivers_with_post_malformed_since() {
  let state = make_state().await;
  let (status, body) = post(&state, BULK, json!({"since": 123})).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["message"], "'since' parameter not in ISO8601 format");
}

#[tokio::test]
async fn bulk_lookup_honours_include_obsolete() {
  let state = make_state().await;
  let old = NewWaiver::new(koji_build("glibc-2.26-27.fc27"), "testcase1", "foo-1", "foo");
  let mut new = old.clone();
  new.waived = false;
  let seeded = seed(&state, vec![old, new]).await;

  let results = json!([{"subject": {"type": "koji_build", "item": "glibc-2.26-27.fc27"}, "testcase": "testcase1"}]);
  let (_, body) = post(&state, BULK, json!({ "results": results })).await;
  assert_eq!(ids(&body), vec![seeded[1]]);

  let (_, body) =
    post(&state, BULK, json!({ "results": results, "include_obsolete": true })).await;
  assert_eq!(ids(&body), vec![seeded[1], seeded[0]]);
}

// ─── Service ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn healthcheck() {
  let state = make_state().await;
  let (status, body) = get(&state, "/healthcheck").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, "Health check OK");
}

#[tokio::test]
async fn about_endpoint() {
  let state = make_state().await;
  let (status, body) = get(&state, "/api/v1.0/about").await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
  assert_eq!(body["auth_method"], "dummy");
}

#[tokio::test]
async fn cors_headers_when_configured() {
  let origin = "https://bodhi.fedoraproject.org";
  let state = make_state_with(StubLookup::default(), Some(origin)).await;
  seed_distinct(&state, 3).await;

  for uri in ["/api/v1.0/about", WAIVERS] {
    let (status, headers, _) = send(&state, "GET", uri, vec![(header::ORIGIN, origin)], None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], origin);
  }

  let (_, headers, _) = send(
    &state,
    "OPTIONS",
    WAIVERS,
    vec![
      (header::ORIGIN, origin),
      (header::ACCESS_CONTROL_REQUEST_METHOD, "POST"),
      (header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type"),
    ],
    None,
  )
  .await;
  let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
  assert!(methods.contains("POST") && methods.contains("OPTIONS"), "{methods}");
  let allowed = headers[header::ACCESS_CONTROL_ALLOW_HEADERS].to_str().unwrap();
  assert!(allowed.eq_ignore_ascii_case("content-type"), "{allowed}");
}

#[tokio::test]
async fn no_cors_headers_by_default() {
  let state = make_state().await;
  let origin = "https://bodhi.fedoraproject.org";
  for uri in ["/api/v1.0/about", WAIVERS] {
    let (status, headers, _) = send(&state, "GET", uri, vec![(header::ORIGIN, origin)], None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
  }
}

// ─── Panics ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn panicking_handler_answers_500() {
  let state = AppState {
    store:   Arc::new(SqliteStore::open_in_memory().await.unwrap()),
    config:  Arc::new(server_config(None)),
    results: Arc::new(PanickingLookup),
  };
  let (status, body) = post_as(
    &state,
    "foo",
    WAIVERS,
    json!({"result_id": 123, "product_version": "fool-1", "waived": true, "comment": "it broke"}),
  )
  .await;

  assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
  assert_eq!(body, json!({"message": ""}));
  assert_eq!(state.store.count_waivers().await.unwrap(), 0);

  // The router keeps serving afterwards.
  let (status, _) = get(&state, WAIVERS).await;
  assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn empty_subject_is_treated_as_missing() {
  let state = make_state().await;
  let mut item = glibc_waiver();
  item["subject"] = json!({});
  let (status, body) = post_as(&state, "foo", WAIVERS, item).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["message"], "Either result_id or subject/testcase are required arguments.");
  assert_eq!(state.store.count_waivers().await.unwrap(), 0);
}
