//! The `StateStore` trait and supporting record types.
//!
//! The trait is implemented by storage backends (e.g. `fable-store-sqlite`).
//! Higher layers (`fable-api`, `fable-server`) depend on this abstraction, not
//! on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};

// ─── Record types ────────────────────────────────────────────────────────────

/// A stored value together with the version token the store issued for it.
///
/// Versions are opaque to callers beyond two guarantees: every successful
/// write to a key produces a version different from all earlier versions of
/// that key, and [`StateStore::put_if_version`] only lands when the caller's
/// expectation matches the stored token exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
  pub bytes:   Vec<u8>,
  pub version: u64,
}

/// Outcome of a conditional write.
///
/// A conflict is an ordinary value, not an error: every caller of
/// [`StateStore::put_if_version`] has to decide what a lost race means for
/// it, and the type makes that decision unavoidable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cas {
  /// The write landed; the record now carries this version.
  Stored(u64),
  /// The expectation no longer held; nothing was written.
  Conflict,
}

impl Cas {
  pub fn is_conflict(&self) -> bool { matches!(self, Cas::Conflict) }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a versioned key-value store.
///
/// The store itself offers no transactions and no multi-key atomicity; the
/// only concurrency primitive is the per-key version token consumed by
/// [`put_if_version`](StateStore::put_if_version). Atomic read-modify-write
/// is built on top of it in `repository`.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait StateStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Read a record. Returns `None` for missing keys and for records whose
  /// expiry has passed.
  fn get<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<Versioned>, Self::Error>> + Send + 'a;

  /// Unconditional write. Creates or replaces the record and bumps its
  /// version. A record with `expires_at` set reads as absent from that
  /// instant on.
  fn put<'a>(
    &'a self,
    key: &'a str,
    bytes: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Conditional write. With `expected = Some(v)` the write lands only if
  /// the stored version is exactly `v`; with `expected = None` it lands only
  /// if the key is absent. Records written this way do not expire.
  fn put_if_version<'a>(
    &'a self,
    key: &'a str,
    bytes: Vec<u8>,
    expected: Option<u64>,
  ) -> impl Future<Output = Result<Cas, Self::Error>> + Send + 'a;

  /// Remove a record. Deleting a missing key is a no-op.
  fn delete<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
