//! In-memory collaborator implementations.
//!
//! Used by tests across the workspace and suitable for ephemeral wiring
//! where durability does not matter. All three types are cheaply cloneable
//! handles over shared state, so a test can keep one handle and give the
//! other to the component under test.

use std::{
  collections::HashMap,
  sync::{
    Arc, Mutex,
    atomic::{AtomicU32, Ordering},
  },
};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
  broadcast::{Broadcast, BroadcastError},
  source::{Candidate, CandidateSource, RoundTag, SourceError},
  store::{Cas, StateStore, Versioned},
};

// ─── MemoryStore ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct MemoryRecord {
  bytes:      Vec<u8>,
  version:    u64,
  expires_at: Option<DateTime<Utc>>,
}

impl MemoryRecord {
  fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self.expires_at.is_some_and(|at| at <= now)
  }
}

#[derive(Debug, Error)]
#[error("memory store lock poisoned")]
pub struct MemoryStoreError;

/// HashMap-backed [`StateStore`] with per-key version counters and lazy
/// expiry, mirroring the sqlite backend's observable behaviour.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
  records: Arc<Mutex<HashMap<String, MemoryRecord>>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  fn with_records<R>(
    &self,
    f: impl FnOnce(&mut HashMap<String, MemoryRecord>) -> R,
  ) -> Result<R, MemoryStoreError> {
    let mut records = self.records.lock().map_err(|_| MemoryStoreError)?;
    Ok(f(&mut records))
  }
}

impl StateStore for MemoryStore {
  type Error = MemoryStoreError;

  async fn get(&self, key: &str) -> Result<Option<Versioned>, MemoryStoreError> {
    let now = Utc::now();
    self.with_records(|records| {
      if records.get(key).is_some_and(|r| r.is_expired(now)) {
        records.remove(key);
      }
      records.get(key).map(|r| Versioned {
        bytes:   r.bytes.clone(),
        version: r.version,
      })
    })
  }

  async fn put(
    &self,
    key: &str,
    bytes: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
  ) -> Result<(), MemoryStoreError> {
    self.with_records(|records| {
      let version = records.get(key).map_or(0, |r| r.version) + 1;
      records
        .insert(key.to_owned(), MemoryRecord { bytes, version, expires_at });
    })
  }

  async fn put_if_version(
    &self,
    key: &str,
    bytes: Vec<u8>,
    expected: Option<u64>,
  ) -> Result<Cas, MemoryStoreError> {
    let now = Utc::now();
    self.with_records(|records| {
      if records.get(key).is_some_and(|r| r.is_expired(now)) {
        records.remove(key);
      }
      let stored = records.get(key).map(|r| r.version);
      match (expected, stored) {
        (None, None) => {
          records.insert(
            key.to_owned(),
            MemoryRecord { bytes, version: 1, expires_at: None },
          );
          Cas::Stored(1)
        }
        (Some(want), Some(have)) if want == have => {
          let version = have + 1;
          records.insert(
            key.to_owned(),
            MemoryRecord { bytes, version, expires_at: None },
          );
          Cas::Stored(version)
        }
        _ => Cas::Conflict,
      }
    })
  }

  async fn delete(&self, key: &str) -> Result<(), MemoryStoreError> {
    self.with_records(|records| {
      records.remove(key);
    })
  }
}

// ─── StaticSource ────────────────────────────────────────────────────────────

/// Candidate feed over a fixed set, filtered by the requested window like a
/// real feed would filter. Can be told to fail its next fetches to exercise
/// retry paths, and re-pointed at a new candidate set between rounds.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
  candidates: Arc<Mutex<Vec<Candidate>>>,
  failures:   Arc<AtomicU32>,
}

impl StaticSource {
  pub fn new(candidates: Vec<Candidate>) -> Self {
    Self {
      candidates: Arc::new(Mutex::new(candidates)),
      failures:   Arc::new(AtomicU32::new(0)),
    }
  }

  /// Like [`StaticSource::new`], but the first `failures` fetches fail with
  /// a transient error before the feed starts answering.
  pub fn failing(candidates: Vec<Candidate>, failures: u32) -> Self {
    let source = Self::new(candidates);
    source.failures.store(failures, Ordering::SeqCst);
    source
  }

  /// Replace the visible candidate set.
  pub fn set_candidates(&self, candidates: Vec<Candidate>) {
    if let Ok(mut current) = self.candidates.lock() {
      *current = candidates;
    }
  }
}

impl CandidateSource for StaticSource {
  async fn fetch(
    &self,
    _tag: RoundTag,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
  ) -> Result<Vec<Candidate>, SourceError> {
    let inject = self
      .failures
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok();
    if inject {
      return Err(SourceError::Unavailable("injected failure".into()));
    }
    let candidates = self
      .candidates
      .lock()
      .map_err(|_| SourceError::Unavailable("candidate lock poisoned".into()))?;
    Ok(
      candidates
        .iter()
        .filter(|c| c.created_at >= since && c.created_at < until)
        .cloned()
        .collect(),
    )
  }
}

// ─── RecordingBroadcast ──────────────────────────────────────────────────────

/// Captures every published event for later assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingBroadcast {
  events: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
}

impl RecordingBroadcast {
  pub fn new() -> Self { Self::default() }

  pub fn events(&self) -> Vec<(String, serde_json::Value)> {
    self.events.lock().map(|e| e.clone()).unwrap_or_default()
  }

  /// The `event` field of each captured payload, in publication order.
  pub fn event_names(&self) -> Vec<String> {
    self
      .events()
      .into_iter()
      .filter_map(|(_, payload)| {
        payload
          .get("event")
          .and_then(|v| v.as_str())
          .map(str::to_owned)
      })
      .collect()
  }
}

impl Broadcast for RecordingBroadcast {
  async fn publish(
    &self,
    topic: &str,
    payload: serde_json::Value,
  ) -> Result<(), BroadcastError> {
    self
      .events
      .lock()
      .map_err(|_| BroadcastError("recorder lock poisoned".into()))?
      .push((topic.to_owned(), payload));
    Ok(())
  }
}
