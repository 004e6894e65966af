//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with microsecond
//! precision, so lexical order equals chronological order and range filters
//! can compare the column directly. Subjects are stored as their canonical
//! JSON form.

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound as _, Utc};
use waiver_core::{subject::Subject, waiver::Waiver};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Like [`encode_dt`], but rounds sub-microsecond remainders up instead of
/// truncating them.
pub fn encode_dt_ceil(dt: DateTime<Utc>) -> String {
  let truncated = dt.trunc_subsecs(6);
  if truncated == dt {
    encode_dt(dt)
  } else {
    encode_dt(truncated + Duration::microseconds(1))
  }
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// The current time at the precision the store keeps.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

// ─── Subject ─────────────────────────────────────────────────────────────────

pub fn encode_subject(subject: &Subject) -> Result<String> {
  Ok(subject.canonical_json()?)
}

pub fn decode_subject(s: &str) -> Result<Subject> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching the field order of [`RawWaiver::from_row`].
pub const WAIVER_COLUMNS: &str = "w.id, w.subject, w.testcase, w.product_version, \
   w.username, w.proxied_by, w.waived, w.comment, w.timestamp";

/// Raw values read directly from a `waivers` row.
pub struct RawWaiver {
  pub id:              i64,
  pub subject:         String,
  pub testcase:        String,
  pub product_version: String,
  pub username:        String,
  pub proxied_by:      Option<String>,
  pub waived:          bool,
  pub comment:         Option<String>,
  pub timestamp:       String,
}

impl RawWaiver {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:              row.get(0)?,
      subject:         row.get(1)?,
      testcase:        row.get(2)?,
      product_version: row.get(3)?,
      username:        row.get(4)?,
      proxied_by:      row.get(5)?,
      waived:          row.get(6)?,
      comment:         row.get(7)?,
      timestamp:       row.get(8)?,
    })
  }

  pub fn into_waiver(self) -> Result<Waiver> {
    Ok(Waiver {
      id:              self.id,
      subject:         decode_subject(&self.subject)?,
      testcase:        self.testcase,
      product_version: self.product_version,
      username:        self.username,
      proxied_by:      self.proxied_by,
      waived:          self.waived,
      comment:         self.comment,
      timestamp:       decode_dt(&self.timestamp)?,
    })
  }
}
