//! Subject: the structured identifier of the artifact under test.
//!
//! A subject is an arbitrary set of string keys mapped to string values, e.g.
//! `{"type": "koji_build", "item": "glibc-2.26-27.fc27"}`. Key order carries
//! no meaning: the map is sorted, so its JSON form is canonical and two
//! subjects compare equal exactly when their canonical forms do.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(
  Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize,
)]
#[serde(transparent)]
pub struct Subject(BTreeMap<String, String>);

impl Subject {
  pub fn new() -> Self { Self::default() }

  /// Builder-style insert, handy for literals in tests and lookups.
  pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.0.insert(key.into(), value.into());
    self
  }

  pub fn get(&self, key: &str) -> Option<&str> { self.0.get(key).map(String::as_str) }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  /// Accept only a JSON object whose values are all strings.
  pub fn from_json_value(value: &serde_json::Value) -> Result<Self> {
    let object = value.as_object().ok_or(Error::InvalidSubject)?;
    object
      .iter()
      .map(|(k, v)| {
        v.as_str()
          .map(|s| (k.clone(), s.to_owned()))
          .ok_or(Error::InvalidSubject)
      })
      .collect::<Result<BTreeMap<_, _>>>()
      .map(Self)
  }

  /// Parse a JSON object literal such as a `?subject=` query parameter.
  pub fn from_json_str(s: &str) -> Result<Self> {
    let value: serde_json::Value = serde_json::from_str(s)?;
    Self::from_json_value(&value)
  }

  /// Compact, sorted-key JSON used for storage and equality filters.
  pub fn canonical_json(&self) -> Result<String> {
    Ok(serde_json::to_string(&self.0)?)
  }
}

impl From<BTreeMap<String, String>> for Subject {
  fn from(map: BTreeMap<String, String>) -> Self { Self(map) }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Subject {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
  }
}
