//! Story — the single mutable aggregate.
//!
//! Exactly one story is ever active. It grows by one sentence per resolved
//! round until it reaches its configured length, then it completes, is
//! archived, and a fresh story takes its place. Completed sentences are
//! immutable; every mutation of the aggregate goes through
//! [`crate::repository::StoryRepository`].

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle state of a story. Transitions only move forward:
/// `Active → Completed → Archived`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryStatus {
  Active,
  Completed,
  Archived,
}

// ─── Sentence ────────────────────────────────────────────────────────────────

/// One appended sentence — the trimmed text of the candidate that won a
/// round, plus enough of the candidate to audit the result later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
  pub text:        String,
  /// Submitter credited with the sentence; the reserved system identity for
  /// fallback sentences.
  pub author:      String,
  /// The winning candidate's score at resolution time; 0 for fallbacks.
  pub score:       i64,
  /// End bound of the round window this sentence resolved.
  pub appended_at: DateTime<Utc>,
}

// ─── Story ───────────────────────────────────────────────────────────────────

/// The story aggregate. Serialised whole as the value of a single store key,
/// so every update replaces the full record under one version token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
  pub story_id:         Uuid,
  pub created_at:       DateTime<Utc>,
  pub sentences:        Vec<Sentence>,
  /// 1-based. Always `sentences.len() + 1`: the round currently collecting
  /// candidates while active, one past the final round once completed.
  pub round_number:     u32,
  /// Running sum of winning scores.
  pub total_votes:      i64,
  pub status:           StoryStatus,
  /// Every identity that authored at least one sentence.
  pub contributors:     BTreeSet<String>,
  /// Set exactly once, when the story reaches full length.
  pub completed_at:     Option<DateTime<Utc>>,
  /// End bound of the most recently settled round window. Ticks whose
  /// window ends at or before this instant have nothing left to do.
  pub resolved_through: DateTime<Utc>,
}

impl Story {
  /// A fresh one-round story. The fence starts at the window floor of the
  /// creation instant, so the tick that created the story cannot also
  /// resolve a round for it; its first round settles at the next boundary.
  pub fn new(created_at: DateTime<Utc>, round_secs: u64) -> Self {
    Self {
      story_id:         Uuid::new_v4(),
      created_at,
      sentences:        Vec::new(),
      round_number:     1,
      total_votes:      0,
      status:           StoryStatus::Active,
      contributors:     BTreeSet::new(),
      completed_at:     None,
      resolved_through: window_floor(created_at, round_secs),
    }
  }

  pub fn is_active(&self) -> bool { self.status == StoryStatus::Active }

  pub fn sentence_count(&self) -> usize { self.sentences.len() }

  /// The successor state after `sentence` resolves the window ending at
  /// `window_end`. Pure; completion fires when the new length reaches
  /// `story_length`.
  pub fn with_appended(
    &self,
    sentence: Sentence,
    window_end: DateTime<Utc>,
    story_length: usize,
  ) -> Story {
    let mut next = self.clone();
    next.total_votes += sentence.score;
    next.contributors.insert(sentence.author.clone());
    next.sentences.push(sentence);
    next.round_number += 1;
    next.resolved_through = window_end;
    if next.sentences.len() >= story_length {
      next.status = StoryStatus::Completed;
      next.completed_at = Some(window_end);
    }
    next
  }

  /// Check every structural invariant of the aggregate. Run on each load
  /// and before each write; a violation means the record is corrupt and
  /// must not be used or repaired in place.
  pub fn check_invariants(&self, story_length: usize) -> Result<(), String> {
    let len = self.sentences.len();
    if len > story_length {
      return Err(format!(
        "sentence count {len} exceeds story length {story_length}"
      ));
    }
    if self.round_number as usize != len + 1 {
      return Err(format!(
        "round number {} does not match sentence count {len}",
        self.round_number
      ));
    }
    match self.status {
      StoryStatus::Active => {
        if len == story_length {
          return Err("active story already at full length".into());
        }
        if self.completed_at.is_some() {
          return Err("active story carries a completion timestamp".into());
        }
      }
      StoryStatus::Completed | StoryStatus::Archived => {
        if len != story_length {
          return Err(format!(
            "{:?} story has {len} sentences, expected {story_length}",
            self.status
          ));
        }
        match self.completed_at {
          None => return Err("finished story has no completion timestamp".into()),
          Some(at) if at < self.created_at => {
            return Err("completion timestamp precedes creation".into());
          }
          Some(_) => {}
        }
      }
    }
    let sum: i64 = self.sentences.iter().map(|s| s.score).sum();
    if sum != self.total_votes {
      return Err(format!(
        "total votes {} does not match sentence score sum {sum}",
        self.total_votes
      ));
    }
    let authors: BTreeSet<&str> =
      self.sentences.iter().map(|s| s.author.as_str()).collect();
    for author in &authors {
      if !self.contributors.contains(*author) {
        return Err(format!("author {author} missing from contributors"));
      }
    }
    for contributor in &self.contributors {
      if !authors.contains(contributor.as_str()) {
        return Err(format!(
          "contributor {contributor} authored no sentence"
        ));
      }
    }
    Ok(())
  }
}

// ─── Round grid ──────────────────────────────────────────────────────────────

/// Truncate an instant down to the round grid: the largest multiple of
/// `round_secs` (counted from the Unix epoch) not after `t`.
pub fn window_floor(t: DateTime<Utc>, round_secs: u64) -> DateTime<Utc> {
  let period = round_secs.max(1) as i64;
  let rem = t.timestamp().rem_euclid(period);
  DateTime::from_timestamp(t.timestamp() - rem, 0).unwrap_or(t)
}

/// The start of the window that ends at `window_end`.
pub fn window_start(window_end: DateTime<Utc>, round_secs: u64) -> DateTime<Utc> {
  window_end - Duration::seconds(round_secs.max(1) as i64)
}
