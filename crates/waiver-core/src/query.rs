//! Query types: filters, time ranges and pagination.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::{Error, Result, subject::Subject};

/// Fixed number of waivers per listing page.
pub const PAGE_SIZE: u32 = 10;

/// The datetime format named in `since` parse errors.
pub const SINCE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.%f";

// ─── Since ───────────────────────────────────────────────────────────────────

/// A lower bound, or an inclusive range, on waiver timestamps.
///
/// Parsed from `start` or `start,end`. Each bound is either a naive ISO 8601
/// datetime (taken as UTC) or an RFC 3339 datetime with an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Since {
  pub start: DateTime<Utc>,
  pub end:   Option<DateTime<Utc>>,
}

impl Since {
  pub fn contains(&self, at: DateTime<Utc>) -> bool {
    at >= self.start && self.end.is_none_or(|end| at <= end)
  }
}

impl FromStr for Since {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    // Everything after the first comma is the end bound, so a value with
    // extra commas reports the whole tail as the bad literal.
    let (start, end) = match s.split_once(',') {
      Some((start, end)) => (start, Some(end)),
      None => (s, None),
    };
    Ok(Self {
      start: parse_instant(start)?,
      end:   end.map(parse_instant).transpose()?,
    })
  }
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Ok(dt.with_timezone(&Utc));
  }
  NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
    .map(|naive| naive.and_utc())
    .map_err(|_| Error::InvalidSince(s.to_owned()))
}

// ─── Filters ─────────────────────────────────────────────────────────────────

/// Parameters for [`crate::store::WaiverStore::list_waivers`] and, minus
/// `subject`/`testcase`, for
/// [`crate::store::WaiverStore::find_by_results`]. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaiverFilter {
  pub subject:          Option<Subject>,
  pub testcase:         Option<String>,
  pub product_version:  Option<String>,
  pub username:         Option<String>,
  pub proxied_by:       Option<String>,
  pub since:            Option<Since>,
  /// If `false`, only the current waiver of each supersession key is
  /// returned.
  pub include_obsolete: bool,
}

/// One (subject, testcase) pair of a bulk lookup. A missing part matches
/// anything, so an empty ref matches every waiver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultRef {
  pub subject:  Option<Subject>,
  pub testcase: Option<String>,
}

impl ResultRef {
  pub fn new(subject: Subject, testcase: impl Into<String>) -> Self {
    Self { subject: Some(subject), testcase: Some(testcase.into()) }
  }

  pub fn is_unrestricted(&self) -> bool {
    self.subject.is_none() && self.testcase.is_none()
  }
}

// ─── Pagination ──────────────────────────────────────────────────────────────

/// A 1-indexed page of [`PAGE_SIZE`] waivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
  pub page: u32,
}

impl PageRequest {
  pub fn new(page: u32) -> Self { Self { page: page.max(1) } }

  pub fn offset(&self) -> u64 { u64::from(self.page - 1) * u64::from(PAGE_SIZE) }
}

impl Default for PageRequest {
  fn default() -> Self { Self { page: 1 } }
}

/// One page of a listing plus what is needed to link to its neighbours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaiverPage {
  pub items:    Vec<crate::waiver::Waiver>,
  pub page:     u32,
  pub per_page: u32,
  /// Number of waivers matching the filter across all pages.
  pub total:    u64,
}

impl WaiverPage {
  /// Number of pages; an empty listing still has one (empty) page.
  pub fn pages(&self) -> u32 {
    let per_page = u64::from(self.per_page.max(1));
    let pages = self.total.div_ceil(per_page).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
  }

  pub fn has_prev(&self) -> bool { self.page > 1 }

  pub fn has_next(&self) -> bool { self.page < self.pages() }
}
