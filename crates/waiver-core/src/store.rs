//! The `WaiverStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `waiver-store-sqlite`).
//! The HTTP layer depends on this abstraction, not on any concrete backend.

use std::future::Future;

use crate::{
  query::{PageRequest, ResultRef, WaiverFilter, WaiverPage},
  waiver::{NewWaiver, SupersessionKey, Waiver},
};

/// Abstraction over a waiver store backend.
///
/// The store is an append-only log: waivers are inserted and never updated
/// or deleted. Whether a waiver is current or obsolete is derived at read
/// time from its [`SupersessionKey`].
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait WaiverStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Persist a batch of waivers atomically and return them, in input order,
  /// with `id` and `timestamp` assigned. If any insert fails, nothing is
  /// persisted.
  fn create_waivers(
    &self,
    inputs: Vec<NewWaiver>,
  ) -> impl Future<Output = Result<Vec<Waiver>, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Retrieve a waiver by id. Returns `None` if not found.
  fn get_waiver(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Waiver>, Self::Error>> + Send + '_;

  /// Total number of stored waivers, current and obsolete.
  fn count_waivers(
    &self,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// The current waiver for `key`: the one with the highest id sharing the
  /// exact key. `None` if no waiver has that key.
  fn current_waiver<'a>(
    &'a self,
    key: &'a SupersessionKey,
  ) -> impl Future<Output = Result<Option<Waiver>, Self::Error>> + Send + 'a;

  /// One page of waivers matching `filter`, most recent first.
  fn list_waivers<'a>(
    &'a self,
    filter: &'a WaiverFilter,
    page: PageRequest,
  ) -> impl Future<Output = Result<WaiverPage, Self::Error>> + Send + 'a;

  /// Waivers matching any of `results`, most recent first, each at most
  /// once. `filter.subject` and `filter.testcase` are ignored; an empty
  /// `results`, or one containing an unrestricted ref, matches everything
  /// the rest of the filter allows.
  fn find_by_results<'a>(
    &'a self,
    results: &'a [ResultRef],
    filter: &'a WaiverFilter,
  ) -> impl Future<Output = Result<Vec<Waiver>, Self::Error>> + Send + 'a;

  /// Cheap round-trip used by the health check endpoint.
  fn health_check(
    &self,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
