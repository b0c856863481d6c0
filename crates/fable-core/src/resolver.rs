//! Round resolution — validate one round's candidates and pick a winner.
//!
//! Resolution never writes and never retries; it reads the candidate feed
//! once and reduces it to a single [`Decision`]. The lifecycle owns applying
//! that decision to the story, so resolving the same round twice is
//! harmless by construction.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
  settings::Settings,
  source::{Candidate, CandidateSource, RoundTag, SourceError},
};

// ─── Round descriptor ────────────────────────────────────────────────────────

/// The half-open interval `[start, end)` a round collects candidates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundWindow {
  pub start: DateTime<Utc>,
  pub end:   DateTime<Utc>,
}

/// One story round awaiting resolution.
#[derive(Debug, Clone, Copy)]
pub struct Round {
  pub tag:    RoundTag,
  pub window: RoundWindow,
}

// ─── Decision ────────────────────────────────────────────────────────────────

/// The sentence-shaped remains of a winning candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Winner {
  /// Trimmed candidate text; this exact string is appended.
  pub text:         String,
  pub submitter_id: String,
  pub score:        i64,
}

/// Exactly one decision per resolved round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
  /// A validated candidate won the round.
  Append(Winner),
  /// No candidate survived validation; the configured fallback sentence
  /// advances the story instead.
  Fallback,
  /// The window has not elapsed yet. A guard, not a normal path: callers
  /// only ask about windows the grid says are over.
  NotElapsed,
}

// ─── Resolver ────────────────────────────────────────────────────────────────

pub struct RoundResolver<C> {
  source:   C,
  settings: Arc<Settings>,
}

impl<C: CandidateSource> RoundResolver<C> {
  pub fn new(source: C, settings: Arc<Settings>) -> Self {
    Self { source, settings }
  }

  /// Resolve `round` as seen at `now`. One fetch, no writes.
  pub async fn resolve(
    &self,
    round: &Round,
    now: DateTime<Utc>,
  ) -> Result<Decision, SourceError> {
    if round.window.end > now {
      return Ok(Decision::NotElapsed);
    }
    let candidates = self
      .source
      .fetch(round.tag, round.window.start, round.window.end)
      .await?;
    Ok(self.decide(round, &candidates))
  }

  /// Pure selection over an already-fetched candidate set.
  pub fn decide(&self, round: &Round, candidates: &[Candidate]) -> Decision {
    let valid: Vec<&Candidate> = candidates
      .iter()
      .filter(|candidate| {
        let ok = self.within_bounds(&candidate.text);
        if !ok {
          debug!(
            round = %round.tag,
            candidate = %candidate.id,
            chars = candidate.text.trim().chars().count(),
            "discarding candidate outside length bounds"
          );
        }
        ok
      })
      .collect();
    match select_winner(&valid) {
      Some(winner) => Decision::Append(Winner {
        text:         winner.text.trim().to_owned(),
        submitter_id: winner.submitter_id.clone(),
        score:        winner.score,
      }),
      None => Decision::Fallback,
    }
  }

  /// Character count of the trimmed text, bounds inclusive. Counting
  /// characters rather than bytes keeps multibyte submissions fair.
  fn within_bounds(&self, text: &str) -> bool {
    let chars = text.trim().chars().count();
    chars >= self.settings.min_sentence_chars
      && chars <= self.settings.max_sentence_chars
  }
}

/// Highest score wins; ties go to the earliest submission, then the
/// smallest id. The id leg makes the order total, so any permutation of
/// the same set selects the same candidate.
pub fn select_winner<'a>(candidates: &[&'a Candidate]) -> Option<&'a Candidate> {
  candidates.iter().copied().min_by(|a, b| {
    b.score
      .cmp(&a.score)
      .then(a.created_at.cmp(&b.created_at))
      .then(a.id.cmp(&b.id))
  })
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use uuid::Uuid;

  use super::*;

  fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, h, m, 0).unwrap()
  }

  fn candidate(id: &str, text: &str, score: i64, created: DateTime<Utc>) -> Candidate {
    Candidate {
      id: id.into(),
      text: text.into(),
      score,
      submitter_id: format!("user-{id}"),
      created_at: created,
    }
  }

  fn resolver() -> RoundResolver<crate::mock::StaticSource> {
    RoundResolver::new(
      crate::mock::StaticSource::new(vec![]),
      Arc::new(Settings::default()),
    )
  }

  fn round() -> Round {
    Round {
      tag:    RoundTag { story_id: Uuid::new_v4(), round_number: 4 },
      window: RoundWindow { start: at(13, 0), end: at(14, 0) },
    }
  }

  #[test]
  fn highest_score_wins() {
    let r = resolver();
    let candidates = vec![
      candidate("a", "The fox slipped under the fence.", 3, at(13, 5)),
      candidate("b", "A storm rolled in from the east.", 7, at(13, 20)),
      candidate("c", "Nothing moved on the empty road.", 5, at(13, 1)),
    ];
    let Decision::Append(winner) = r.decide(&round(), &candidates) else {
      panic!("expected a winner");
    };
    assert_eq!(winner.text, "A storm rolled in from the east.");
    assert_eq!(winner.score, 7);
  }

  #[test]
  fn score_tie_goes_to_earliest_submission() {
    let r = resolver();
    let candidates = vec![
      candidate("late", "The fox slipped under the fence.", 7, at(13, 30)),
      candidate("early", "A storm rolled in from the east.", 7, at(13, 10)),
    ];
    let Decision::Append(winner) = r.decide(&round(), &candidates) else {
      panic!("expected a winner");
    };
    assert_eq!(winner.submitter_id, "user-early");
  }

  #[test]
  fn full_tie_goes_to_smallest_id() {
    let r = resolver();
    let candidates = vec![
      candidate("b", "The fox slipped under the fence.", 7, at(13, 10)),
      candidate("a", "A storm rolled in from the east.", 7, at(13, 10)),
    ];
    let Decision::Append(winner) = r.decide(&round(), &candidates) else {
      panic!("expected a winner");
    };
    assert_eq!(winner.submitter_id, "user-a");
  }

  #[test]
  fn selection_is_order_independent() {
    let r = resolver();
    let base = vec![
      candidate("a", "The fox slipped under the fence.", 7, at(13, 10)),
      candidate("b", "A storm rolled in from the east.", 7, at(13, 10)),
      candidate("c", "Nothing moved on the empty road.", 5, at(13, 1)),
    ];
    let orders: [[usize; 3]; 6] =
      [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
    for order in orders {
      let shuffled: Vec<Candidate> =
        order.iter().map(|&i| base[i].clone()).collect();
      let Decision::Append(winner) = r.decide(&round(), &shuffled) else {
        panic!("expected a winner");
      };
      assert_eq!(winner.submitter_id, "user-a", "order {order:?}");
    }
  }

  #[test]
  fn out_of_bounds_candidates_are_discarded() {
    let r = resolver();
    let long = "x".repeat(151);
    let candidates = vec![
      candidate("short", "tiny", 40, at(13, 5)),
      candidate("long", &long, 30, at(13, 6)),
      candidate("ok", "Just enough words to pass.", 1, at(13, 7)),
    ];
    let Decision::Append(winner) = r.decide(&round(), &candidates) else {
      panic!("expected a winner");
    };
    assert_eq!(winner.submitter_id, "user-ok");
  }

  #[test]
  fn bounds_count_characters_not_bytes() {
    let r = resolver();
    // Ten characters, twenty bytes.
    let multibyte = "é".repeat(10);
    let candidates = vec![candidate("mb", &multibyte, 1, at(13, 5))];
    assert!(matches!(r.decide(&round(), &candidates), Decision::Append(_)));

    let too_short = "é".repeat(9);
    let candidates = vec![candidate("mb", &too_short, 1, at(13, 5))];
    assert_eq!(r.decide(&round(), &candidates), Decision::Fallback);
  }

  #[test]
  fn winner_text_is_trimmed() {
    let r = resolver();
    let candidates =
      vec![candidate("a", "  padded but plausible text  ", 2, at(13, 5))];
    let Decision::Append(winner) = r.decide(&round(), &candidates) else {
      panic!("expected a winner");
    };
    assert_eq!(winner.text, "padded but plausible text");
  }

  #[test]
  fn whitespace_only_falls_back() {
    let r = resolver();
    let candidates = vec![candidate("ws", "              ", 50, at(13, 5))];
    assert_eq!(r.decide(&round(), &candidates), Decision::Fallback);
  }

  #[test]
  fn empty_round_falls_back() {
    let r = resolver();
    assert_eq!(r.decide(&round(), &[]), Decision::Fallback);
  }

  #[tokio::test]
  async fn unelapsed_window_is_not_resolved() {
    let r = resolver();
    let decision = r.resolve(&round(), at(13, 59)).await.unwrap();
    assert_eq!(decision, Decision::NotElapsed);
  }

  #[tokio::test]
  async fn elapsed_window_resolves_at_the_boundary() {
    let r = resolver();
    let decision = r.resolve(&round(), at(14, 0)).await.unwrap();
    assert_eq!(decision, Decision::Fallback);
  }
}
