//! Parsing and validation of request payloads into core types.
//!
//! Nothing here touches the store: a request that fails to parse is rejected
//! before any waiver is read or written.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use waiver_core::{
  query::{PageRequest, ResultRef, Since, WaiverFilter},
  subject::Subject,
};

use crate::error::ApiError;

const MISSING: &str = "Missing required parameter in the JSON body";

pub const RESULTS_SHAPE_MESSAGE: &str =
  "'results' parameter should be a list of dictionaries with subject and testcase";

pub const SINCE_FORMAT_MESSAGE: &str = "'since' parameter not in ISO8601 format";

// ─── Waiver creation ─────────────────────────────────────────────────────────

/// Where the subject/testcase of a new waiver come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
  Direct { subject: Subject, testcase: String },
  /// Legacy: resolved through ResultsDB before the waiver is stored.
  Result(i64),
}

/// One validated item of a `POST /waivers/` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateWaiver {
  pub target:          Target,
  pub product_version: String,
  pub waived:          bool,
  pub comment:         String,
  /// The user to record the waiver for, if not the caller.
  pub username:        Option<String>,
}

/// Field-by-field reader that collects every type error before failing.
struct Fields<'a> {
  object: &'a Map<String, Value>,
  errors: BTreeMap<String, String>,
}

impl<'a> Fields<'a> {
  fn string(&mut self, name: &str) -> Option<String> {
    match self.object.get(name) {
      None | Some(Value::Null) => None,
      Some(Value::String(s)) => Some(s.clone()),
      Some(_) => {
        self.errors.insert(name.to_owned(), "Must be a string".to_owned());
        None
      }
    }
  }

  fn required<T>(&mut self, name: &str, value: Option<T>) -> Option<T> {
    if value.is_none() && !self.errors.contains_key(name) {
      self.errors.insert(name.to_owned(), MISSING.to_owned());
    }
    value
  }

  fn bool(&mut self, name: &str) -> Option<bool> {
    match self.object.get(name) {
      None | Some(Value::Null) => None,
      Some(Value::Bool(b)) => Some(*b),
      Some(_) => {
        self.errors.insert(name.to_owned(), "Must be a boolean".to_owned());
        None
      }
    }
  }

  fn integer(&mut self, name: &str) -> Option<i64> {
    match self.object.get(name) {
      None | Some(Value::Null) => None,
      Some(v) => v.as_i64().or_else(|| {
        self.errors.insert(name.to_owned(), "Must be an integer".to_owned());
        None
      }),
    }
  }

  fn subject(&mut self, name: &str) -> Option<Subject> {
    match self.object.get(name) {
      None | Some(Value::Null) => None,
      Some(v) => Subject::from_json_value(v).ok().or_else(|| {
        self.errors.insert(name.to_owned(), "Must be a valid dict".to_owned());
        None
      }),
    }
  }
}

/// Validate one item of a creation request.
pub fn parse_create_item(item: &Value) -> Result<CreateWaiver, ApiError> {
  let object = item
    .as_object()
    .ok_or_else(|| ApiError::BadRequest("Each waiver must be a JSON object.".into()))?;
  let mut fields = Fields { object, errors: BTreeMap::new() };

  let subject = fields.subject("subject");
  let testcase = fields.string("testcase");
  let result_id = fields.integer("result_id");
  let product_version = fields.string("product_version");
  let product_version = fields.required("product_version", product_version);
  let waived = fields.bool("waived");
  let waived = fields.required("waived", waived);
  let comment = fields.string("comment");
  let username = fields.string("username");

  if !fields.errors.is_empty() {
    return Err(ApiError::InvalidFields(fields.errors));
  }
  let (Some(product_version), Some(waived)) = (product_version, waived) else {
    return Err(ApiError::BadRequest(MISSING.into()));
  };

  // An empty subject or testcase counts as not given.
  let subject = subject.filter(|s| !s.is_empty());
  let testcase = testcase.filter(|t| !t.is_empty());
  let target = match (subject, testcase, result_id) {
    (Some(subject), Some(testcase), _) => Target::Direct { subject, testcase },
    (_, _, Some(result_id)) => Target::Result(result_id),
    _ => {
      return Err(ApiError::BadRequest(
        "Either result_id or subject/testcase are required arguments.".into(),
      ));
    }
  };

  let comment = comment
    .filter(|c| !c.is_empty())
    .ok_or_else(|| ApiError::BadRequest("Comment is a required argument.".into()))?;

  Ok(CreateWaiver { target, product_version, waived, comment, username })
}

// ─── Listing ─────────────────────────────────────────────────────────────────

/// Raw query parameters of `GET /waivers/`. Kept as strings so they can be
/// echoed into pagination links exactly as received.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
  pub subject:          Option<String>,
  pub testcase:         Option<String>,
  pub product_version:  Option<String>,
  pub username:         Option<String>,
  pub proxied_by:       Option<String>,
  pub since:            Option<String>,
  pub include_obsolete: Option<String>,
  pub page:             Option<String>,
}

impl ListParams {
  /// Active filters in link order, as `(name, raw value)` pairs. `page` is
  /// not included.
  pub fn filter_pairs(&self) -> impl Iterator<Item = (&'static str, &str)> {
    [
      ("subject", &self.subject),
      ("testcase", &self.testcase),
      ("product_version", &self.product_version),
      ("username", &self.username),
      ("proxied_by", &self.proxied_by),
      ("since", &self.since),
      ("include_obsolete", &self.include_obsolete),
    ]
    .into_iter()
    .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
  }

  pub fn parse(&self) -> Result<(WaiverFilter, PageRequest), ApiError> {
    let mut errors = BTreeMap::new();

    let subject = self.subject.as_deref().and_then(|raw| {
      match serde_json::from_str::<Value>(raw) {
        Err(e) => {
          errors.insert("subject".to_owned(), format!("Invalid JSON: {e}"));
          None
        }
        Ok(value) => Subject::from_json_value(&value).ok().or_else(|| {
          errors.insert("subject".to_owned(), "Must be a valid dict".to_owned());
          None
        }),
      }
    });

    let since = self.since.as_deref().and_then(|raw| {
      raw
        .parse::<Since>()
        .map_err(|e| errors.insert("since".to_owned(), e.to_string()))
        .ok()
    });

    let include_obsolete = match self.include_obsolete.as_deref().map(parse_flag) {
      None => false,
      Some(Some(flag)) => flag,
      Some(None) => {
        errors.insert("include_obsolete".to_owned(), "Must be a boolean".to_owned());
        false
      }
    };

    let page = match self.page.as_deref() {
      None => PageRequest::default(),
      Some(raw) => match raw.parse::<u32>() {
        Ok(n) if n >= 1 => PageRequest::new(n),
        _ => {
          errors.insert("page".to_owned(), "Must be a positive integer".to_owned());
          PageRequest::default()
        }
      },
    };

    if !errors.is_empty() {
      return Err(ApiError::InvalidFields(errors));
    }

    let filter = WaiverFilter {
      subject,
      testcase: self.testcase.clone(),
      product_version: self.product_version.clone(),
      username: self.username.clone(),
      proxied_by: self.proxied_by.clone(),
      since,
      include_obsolete,
    };
    Ok((filter, page))
  }
}

fn parse_flag(raw: &str) -> Option<bool> {
  match raw.to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Some(true),
    "0" | "false" | "no" | "off" | "" => Some(false),
    _ => None,
  }
}

// ─── Bulk lookup ─────────────────────────────────────────────────────────────

/// Validate a `POST /waivers/+by-subjects-and-testcases` body.
pub fn parse_bulk_lookup(body: &Value) -> Result<(Vec<ResultRef>, WaiverFilter), ApiError> {
  let empty = Map::new();
  let object = match body {
    Value::Null => &empty,
    Value::Object(object) => object,
    _ => return Err(ApiError::BadRequest("Request body must be a JSON object.".into())),
  };

  let results = match object.get("results") {
    None | Some(Value::Null) => Vec::new(),
    Some(Value::Array(items)) => {
      items.iter().map(parse_result_ref).collect::<Result<Vec<_>, _>>()?
    }
    Some(_) => return Err(ApiError::BadRequest(RESULTS_SHAPE_MESSAGE.into())),
  };

  let since = match object.get("since") {
    None | Some(Value::Null) => None,
    Some(Value::String(raw)) => Some(
      raw
        .parse::<Since>()
        .map_err(|_| ApiError::BadRequest(SINCE_FORMAT_MESSAGE.into()))?,
    ),
    Some(_) => return Err(ApiError::BadRequest(SINCE_FORMAT_MESSAGE.into())),
  };

  let product_version = match object.get("product_version") {
    None | Some(Value::Null) => None,
    Some(Value::String(s)) => Some(s.clone()),
    Some(_) => {
      return Err(ApiError::BadRequest(
        "'product_version' parameter should be a string".into(),
      ));
    }
  };

  let include_obsolete = match object.get("include_obsolete") {
    None | Some(Value::Null) => false,
    Some(Value::Bool(b)) => *b,
    Some(_) => {
      return Err(ApiError::BadRequest(
        "'include_obsolete' parameter should be a boolean".into(),
      ));
    }
  };

  let filter = WaiverFilter {
    product_version,
    since,
    include_obsolete,
    ..Default::default()
  };
  Ok((results, filter))
}

fn parse_result_ref(item: &Value) -> Result<ResultRef, ApiError> {
  let shape_error = || ApiError::BadRequest(RESULTS_SHAPE_MESSAGE.into());
  let object = item.as_object().ok_or_else(shape_error)?;

  let mut result = ResultRef::default();
  for (key, value) in object {
    match (key.as_str(), value) {
      ("subject", v) => {
        result.subject = Some(Subject::from_json_value(v).map_err(|_| shape_error())?);
      }
      ("testcase", Value::String(s)) => result.testcase = Some(s.clone()),
      _ => return Err(shape_error()),
    }
  }
  Ok(result)
}
