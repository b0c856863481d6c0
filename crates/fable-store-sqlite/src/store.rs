//! [`SqliteStore`] — the SQLite implementation of [`StateStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;

use fable_core::store::{Cas, StateStore, Versioned};

use crate::{Error, Result, schema::SCHEMA};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A fable state store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted, and every
/// clone shares one worker thread so statements never interleave.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
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
}

// ─── StateStore impl ─────────────────────────────────────────────────────────

/// Purges rows whose expiry has passed before the statement that follows, so
/// an expired record behaves exactly like a missing one.
const PURGE_EXPIRED: &str =
  "DELETE FROM records WHERE key = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2";

impl StateStore for SqliteStore {
  type Error = Error;

  async fn get(&self, key: &str) -> Result<Option<Versioned>> {
    let key = key.to_owned();
    let now = Utc::now().timestamp_millis();
    let row = self
      .conn
      .call(move |conn| {
        conn.execute(PURGE_EXPIRED, rusqlite::params![key, now])?;
        let row = conn
          .query_row(
            "SELECT value, version FROM records WHERE key = ?1",
            rusqlite::params![key],
            |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, i64>(1)?)),
          )
          .optional()?;
        Ok(row)
      })
      .await?;
    Ok(row.map(|(bytes, version)| Versioned {
      bytes,
      version: version as u64,
    }))
  }

  async fn put(
    &self,
    key: &str,
    bytes: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
  ) -> Result<()> {
    let key = key.to_owned();
    let expires = expires_at.map(|at| at.timestamp_millis());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO records (key, value, version, expires_at)
           VALUES (?1, ?2, 1, ?3)
           ON CONFLICT(key) DO UPDATE SET
             value      = excluded.value,
             version    = records.version + 1,
             expires_at = excluded.expires_at",
          rusqlite::params![key, bytes, expires],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn put_if_version(
    &self,
    key: &str,
    bytes: Vec<u8>,
    expected: Option<u64>,
  ) -> Result<Cas> {
    let key = key.to_owned();
    let now = Utc::now().timestamp_millis();
    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        // An expired row must neither block creation nor satisfy a stale
        // version expectation.
        tx.execute(PURGE_EXPIRED, rusqlite::params![key, now])?;
        let outcome = match expected {
          None => {
            let inserted = tx.execute(
              "INSERT OR IGNORE INTO records (key, value, version, expires_at)
               VALUES (?1, ?2, 1, NULL)",
              rusqlite::params![key, bytes],
            )?;
            if inserted == 1 { Cas::Stored(1) } else { Cas::Conflict }
          }
          Some(version) => {
            let updated = tx.execute(
              "UPDATE records
               SET value = ?2, version = version + 1, expires_at = NULL
               WHERE key = ?1 AND version = ?3",
              rusqlite::params![key, bytes, version as i64],
            )?;
            if updated == 1 {
              Cas::Stored(version + 1)
            } else {
              Cas::Conflict
            }
          }
        };
        tx.commit()?;
        Ok(outcome)
      })
      .await?;
    Ok(outcome)
  }

  async fn delete(&self, key: &str) -> Result<()> {
    let key = key.to_owned();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM records WHERE key = ?1",
          rusqlite::params![key],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
