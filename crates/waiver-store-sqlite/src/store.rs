//! [`SqliteStore`], the SQLite implementation of [`WaiverStore`].

use std::path::Path;

use rusqlite::OptionalExtension as _;
use waiver_core::{
  query::{PAGE_SIZE, PageRequest, ResultRef, WaiverFilter, WaiverPage},
  store::WaiverStore,
  waiver::{NewWaiver, SupersessionKey, Waiver},
};

use crate::{
  Result,
  encode::{RawWaiver, WAIVER_COLUMNS, decode_dt, encode_dt, encode_subject, now},
  filter::WhereClause,
  schema::SCHEMA,
};

/// Id of the current waiver for a supersession key, or NULL.
const CURRENT_ID_FOR_KEY: &str = "SELECT MAX(id) FROM waivers
   WHERE subject = ?1 AND testcase = ?2 AND username = ?3 AND product_version = ?4";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A waiver store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

/// A waiver as encoded for the `INSERT`, before the store assigns identity.
struct PendingRow {
  subject:         String,
  testcase:        String,
  product_version: String,
  username:        String,
  proxied_by:      Option<String>,
  waived:          bool,
  comment:         Option<String>,
}

/// What the insert transaction hands back for each row.
struct InsertedRow {
  id:         i64,
  timestamp:  String,
  supersedes: Option<i64>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a `SELECT` over `waivers w` with the given tail and decode the rows.
  async fn select_waivers(
    &self,
    tail: String,
    params: Vec<rusqlite::types::Value>,
  ) -> Result<Vec<Waiver>> {
    let raws: Vec<RawWaiver> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {WAIVER_COLUMNS} FROM waivers w {tail}");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawWaiver::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawWaiver::into_waiver).collect()
  }
}

// ─── WaiverStore impl ────────────────────────────────────────────────────────

impl WaiverStore for SqliteStore {
  type Error = crate::Error;

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn create_waivers(&self, inputs: Vec<NewWaiver>) -> Result<Vec<Waiver>> {
    if inputs.is_empty() {
      return Ok(Vec::new());
    }

    let pending = inputs
      .iter()
      .map(|input| {
        Ok(PendingRow {
          subject:         encode_subject(&input.subject)?,
          testcase:        input.testcase.clone(),
          product_version: input.product_version.clone(),
          username:        input.username.clone(),
          proxied_by:      input.proxied_by.clone(),
          waived:          input.waived,
          comment:         input.comment.clone(),
        })
      })
      .collect::<Result<Vec<_>>>()?;

    // One transaction for the whole batch: either every row lands or none.
    let inserted: Vec<InsertedRow> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // Timestamps never go backwards, even if the wall clock does.
        let mut latest: Option<String> =
          tx.query_row("SELECT MAX(timestamp) FROM waivers", [], |r| r.get(0))?;

        let mut inserted = Vec::with_capacity(pending.len());
        for row in pending {
          let supersedes: Option<i64> = tx.query_row(
            CURRENT_ID_FOR_KEY,
            rusqlite::params![row.subject, row.testcase, row.username, row.product_version],
            |r| r.get(0),
          )?;

          let mut timestamp = encode_dt(now());
          if let Some(prev) = latest.take()
            && prev > timestamp
          {
            timestamp = prev;
          }

          tx.execute(
            "INSERT INTO waivers (
               subject, testcase, product_version, username,
               proxied_by, waived, comment, timestamp
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
              row.subject,
              row.testcase,
              row.product_version,
              row.username,
              row.proxied_by,
              row.waived,
              row.comment,
              timestamp,
            ],
          )?;

          inserted.push(InsertedRow {
            id: tx.last_insert_rowid(),
            timestamp: timestamp.clone(),
            supersedes,
          });
          latest = Some(timestamp);
        }

        tx.commit()?;
        Ok(inserted)
      })
      .await?;

    inputs
      .into_iter()
      .zip(inserted)
      .map(|(input, row)| {
        if let Some(old_id) = row.supersedes {
          tracing::debug!(id = row.id, supersedes = old_id, "waiver supersedes an earlier one");
        }
        Ok(Waiver {
          id:              row.id,
          subject:         input.subject,
          testcase:        input.testcase,
          product_version: input.product_version,
          username:        input.username,
          proxied_by:      input.proxied_by,
          waived:          input.waived,
          comment:         input.comment,
          timestamp:       decode_dt(&row.timestamp)?,
        })
      })
      .collect()
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_waiver(&self, id: i64) -> Result<Option<Waiver>> {
    let raw: Option<RawWaiver> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {WAIVER_COLUMNS} FROM waivers w WHERE w.id = ?1"),
            rusqlite::params![id],
            RawWaiver::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawWaiver::into_waiver).transpose()
  }

  async fn count_waivers(&self) -> Result<u64> {
    let count: i64 = self
      .conn
      .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM waivers", [], |r| r.get(0))?))
      .await?;
    Ok(u64::try_from(count).unwrap_or(0))
  }

  async fn current_waiver(&self, key: &SupersessionKey) -> Result<Option<Waiver>> {
    let params = vec![
      encode_subject(&key.subject)?.into(),
      key.testcase.clone().into(),
      key.username.clone().into(),
      key.product_version.clone().into(),
    ];
    let mut found = self
      .select_waivers(
        "WHERE w.subject = ? AND w.testcase = ? AND w.username = ?
           AND w.product_version = ?
         ORDER BY w.id DESC LIMIT 1"
          .to_owned(),
        params,
      )
      .await?;
    Ok(found.pop())
  }

  async fn list_waivers(
    &self,
    filter: &WaiverFilter,
    page: PageRequest,
  ) -> Result<WaiverPage> {
    let clause = WhereClause::for_listing(filter)?;
    let where_sql = clause.sql();
    let params = clause.into_params();
    let limit = i64::from(PAGE_SIZE);
    let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);

    tracing::debug!(?filter, page = page.page, "listing waivers");

    let (total, raws): (i64, Vec<RawWaiver>) = self
      .conn
      .call(move |conn| {
        // Count and page from the same snapshot.
        let tx = conn.transaction()?;
        let total: i64 = tx.query_row(
          &format!("SELECT COUNT(*) FROM waivers w {where_sql}"),
          rusqlite::params_from_iter(params.iter()),
          |r| r.get(0),
        )?;

        let mut page_params = params;
        page_params.push(limit.into());
        page_params.push(offset.into());

        let rows = {
          let mut stmt = tx.prepare(&format!(
            "SELECT {WAIVER_COLUMNS} FROM waivers w {where_sql}
             ORDER BY w.id DESC LIMIT ? OFFSET ?"
          ))?;
          stmt
            .query_map(rusqlite::params_from_iter(page_params.iter()), RawWaiver::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        tx.commit()?;
        Ok((total, rows))
      })
      .await?;

    Ok(WaiverPage {
      items:    raws.into_iter().map(RawWaiver::into_waiver).collect::<Result<_>>()?,
      page:     page.page,
      per_page: PAGE_SIZE,
      total:    u64::try_from(total).unwrap_or(0),
    })
  }

  async fn find_by_results(
    &self,
    results: &[ResultRef],
    filter: &WaiverFilter,
  ) -> Result<Vec<Waiver>> {
    let clause = WhereClause::for_results(results, filter)?;
    let tail = format!("{} ORDER BY w.id DESC", clause.sql());

    tracing::debug!(results = results.len(), ?filter, "bulk waiver lookup");
    self.select_waivers(tail, clause.into_params()).await
  }

  async fn health_check(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
