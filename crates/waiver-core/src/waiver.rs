//! Waiver types, the unit of storage.
//!
//! A waiver is an immutable record that a test result should be disregarded
//! (`waived = true`) or, for an un-waive, no longer disregarded
//! (`waived = false`). Waivers are never updated; a newer waiver with the same
//! [`SupersessionKey`] makes the older ones obsolete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::subject::Subject;

// ─── Waiver ──────────────────────────────────────────────────────────────────

/// A persisted waiver. Once written, no field is ever updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Waiver {
  /// Store-assigned, monotonically increasing, never reused.
  pub id:              i64,
  pub subject:         Subject,
  pub testcase:        String,
  pub product_version: String,
  /// The waived party, not necessarily the submitter.
  pub username:        String,
  /// The submitter, when acting on behalf of `username`.
  pub proxied_by:      Option<String>,
  pub waived:          bool,
  pub comment:         Option<String>,
  /// Server-assigned creation time; never changes after creation.
  pub timestamp:       DateTime<Utc>,
}

impl Waiver {
  pub fn key(&self) -> SupersessionKey {
    SupersessionKey {
      subject:         self.subject.clone(),
      testcase:        self.testcase.clone(),
      username:        self.username.clone(),
      product_version: self.product_version.clone(),
    }
  }
}

// ─── NewWaiver ───────────────────────────────────────────────────────────────

/// Input to [`crate::store::WaiverStore::create_waivers`].
/// `id` and `timestamp` are always set by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWaiver {
  pub subject:         Subject,
  pub testcase:        String,
  pub product_version: String,
  pub username:        String,
  pub proxied_by:      Option<String>,
  pub waived:          bool,
  pub comment:         Option<String>,
}

impl NewWaiver {
  /// A plain waiver (`waived = true`, no proxy, no comment).
  pub fn new(
    subject: Subject,
    testcase: impl Into<String>,
    product_version: impl Into<String>,
    username: impl Into<String>,
  ) -> Self {
    Self {
      subject,
      testcase: testcase.into(),
      product_version: product_version.into(),
      username: username.into(),
      proxied_by: None,
      waived: true,
      comment: None,
    }
  }

  pub fn key(&self) -> SupersessionKey {
    SupersessionKey {
      subject:         self.subject.clone(),
      testcase:        self.testcase.clone(),
      username:        self.username.clone(),
      product_version: self.product_version.clone(),
    }
  }
}

// ─── Supersession ────────────────────────────────────────────────────────────

/// Waivers sharing a key form a chain; only the one with the highest id is
/// current.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SupersessionKey {
  pub subject:         Subject,
  pub testcase:        String,
  pub username:        String,
  pub product_version: String,
}
