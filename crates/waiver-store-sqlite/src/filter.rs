//! Translation of [`WaiverFilter`] and [`ResultRef`] lists into a SQL
//! `WHERE` clause with positional parameters.
//!
//! Every query aliases the `waivers` table as `w`.

use rusqlite::types::Value;
use serde_json::{Value as Json, json};
use waiver_core::query::{ResultRef, WaiverFilter};

use crate::{
  Result,
  encode::{encode_dt, encode_dt_ceil, encode_subject},
};

/// Keeps only the current waiver of each supersession key. Evaluated over the
/// whole table, so a waiver stays obsolete even when its successor is
/// excluded by the other conditions.
const CURRENT_ONLY: &str = "w.id = (
     SELECT MAX(o.id) FROM waivers o
      WHERE o.subject         = w.subject
        AND o.testcase        = w.testcase
        AND o.username        = w.username
        AND o.product_version = w.product_version
   )";

/// Waivers whose (subject, testcase) is one of a JSON array of
/// `{"s": <canonical subject>, "t": <testcase>}` objects.
const PAIR_MATCH: &str = "w.id IN (
     SELECT o.id FROM json_each(?) r
       JOIN waivers o
         ON o.subject  = json_extract(r.value, '$.s')
        AND o.testcase = json_extract(r.value, '$.t')
   )";

/// A conjunction of SQL conditions and the values bound to their `?`s, in
/// order.
#[derive(Debug, Default)]
pub struct WhereClause {
  conds:  Vec<String>,
  params: Vec<Value>,
}

impl WhereClause {
  /// Conditions for a single-query listing, including `subject`/`testcase`.
  pub fn for_listing(filter: &WaiverFilter) -> Result<Self> {
    let mut clause = Self::common(filter);
    if let Some(subject) = &filter.subject {
      clause.eq("w.subject", encode_subject(subject)?);
    }
    if let Some(testcase) = &filter.testcase {
      clause.eq("w.testcase", testcase.clone());
    }
    Ok(clause)
  }

  /// Conditions for a bulk lookup: the filter minus `subject`/`testcase`,
  /// AND any of `results`.
  ///
  /// The refs are bound as JSON arrays and expanded with `json_each`, so the
  /// SQL has the same shape however many refs there are. Full pairs, subject
  /// only and testcase only refs each get one membership test.
  pub fn for_results(results: &[ResultRef], filter: &WaiverFilter) -> Result<Self> {
    let mut clause = Self::common(filter);
    if results.is_empty() || results.iter().any(ResultRef::is_unrestricted) {
      return Ok(clause);
    }

    let mut pairs = Vec::new();
    let mut subjects = Vec::new();
    let mut testcases = Vec::new();
    for result in results {
      match (&result.subject, &result.testcase) {
        (Some(subject), Some(testcase)) => {
          pairs.push(json!({ "s": encode_subject(subject)?, "t": testcase }));
        }
        (Some(subject), None) => subjects.push(Json::String(encode_subject(subject)?)),
        (None, Some(testcase)) => testcases.push(Json::String(testcase.clone())),
        (None, None) => {}
      }
    }

    let mut alternatives = Vec::with_capacity(3);
    if !pairs.is_empty() {
      alternatives.push(PAIR_MATCH);
      clause.params.push(Value::Text(Json::Array(pairs).to_string()));
    }
    if !subjects.is_empty() {
      alternatives.push("w.subject IN (SELECT value FROM json_each(?))");
      clause.params.push(Value::Text(Json::Array(subjects).to_string()));
    }
    if !testcases.is_empty() {
      alternatives.push("w.testcase IN (SELECT value FROM json_each(?))");
      clause.params.push(Value::Text(Json::Array(testcases).to_string()));
    }
    clause.conds.push(format!("({})", alternatives.join(" OR ")));
    Ok(clause)
  }

  fn common(filter: &WaiverFilter) -> Self {
    let mut clause = Self::default();
    if let Some(product_version) = &filter.product_version {
      clause.eq("w.product_version", product_version.clone());
    }
    if let Some(username) = &filter.username {
      clause.eq("w.username", username.clone());
    }
    if let Some(proxied_by) = &filter.proxied_by {
      clause.eq("w.proxied_by", proxied_by.clone());
    }
    if let Some(since) = &filter.since {
      clause.conds.push("w.timestamp >= ?".to_owned());
      // Rounded up: a bound between two stored microseconds must not admit
      // the earlier one.
      clause.params.push(Value::Text(encode_dt_ceil(since.start)));
      if let Some(end) = since.end {
        clause.conds.push("w.timestamp <= ?".to_owned());
        clause.params.push(Value::Text(encode_dt(end)));
      }
    }
    if !filter.include_obsolete {
      clause.conds.push(CURRENT_ONLY.to_owned());
    }
    clause
  }

  fn eq(&mut self, column: &str, value: String) {
    self.conds.push(format!("{column} = ?"));
    self.params.push(Value::Text(value));
  }

  /// `WHERE ...`, or an empty string when there are no conditions.
  pub fn sql(&self) -> String {
    if self.conds.is_empty() {
      String::new()
    } else {
      format!("WHERE {}", self.conds.join(" AND "))
    }
  }

  pub fn into_params(self) -> Vec<Value> { self.params }
}
