//! The `CandidateSource` trait — where round candidates come from.
//!
//! Submissions are collected and voted on in an external surface; this crate
//! only ever reads them back, already scored, when a round resolves.

use std::{fmt, future::Future, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ─── Round tag ───────────────────────────────────────────────────────────────

/// Identifies the story round a submission was collected for. Candidates
/// tagged for any other round are invisible to that round's resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoundTag {
  pub story_id:     Uuid,
  pub round_number: u32,
}

impl fmt::Display for RoundTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}#{}", self.story_id, self.round_number)
  }
}

// ─── Candidate ───────────────────────────────────────────────────────────────

/// A proposed continuation with its externally computed popularity score.
/// Scores are snapshots taken by the source at fetch time; they may be
/// negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
  pub id:           String,
  pub text:         String,
  pub score:        i64,
  pub submitter_id: String,
  pub created_at:   DateTime<Utc>,
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Failure modes of a candidate source.
#[derive(Debug, Error)]
pub enum SourceError {
  /// The source could not be reached or refused the request.
  #[error("candidate source unavailable: {0}")]
  Unavailable(String),

  #[error("candidate fetch timed out after {0:?}")]
  Timeout(Duration),

  /// The source answered with something that does not decode as candidates.
  #[error("candidate payload malformed: {0}")]
  Malformed(String),
}

impl SourceError {
  /// Malformed payloads stay malformed; retrying within a tick buys nothing.
  pub fn is_transient(&self) -> bool {
    matches!(self, SourceError::Unavailable(_) | SourceError::Timeout(_))
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the external submission feed.
///
/// `fetch` must return every publicly visible candidate tagged for `tag`
/// whose submission time falls in the half-open interval `[since, until)`.
pub trait CandidateSource: Send + Sync {
  fn fetch<'a>(
    &'a self,
    tag: RoundTag,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Candidate>, SourceError>> + Send + 'a;
}
