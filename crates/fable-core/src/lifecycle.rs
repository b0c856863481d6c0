//! The lifecycle manager — sole orchestrator of story progression.
//!
//! Everything that moves a story forward funnels through here: scheduled
//! ticks resolve rounds and sweep finished stories into the archive,
//! submission notices are screened against the open round, and the read
//! surface hangs off the same component so every caller shares one view of
//! the rules.
//!
//! Ticks are idempotent. Each round window is settled at most once, fenced
//! by the story's `resolved_through` timestamp, which is re-checked inside
//! the repository's conditional write. Duplicate, late, and racing ticks
//! all collapse into no-ops, so the scheduler can fire as sloppily as it
//! likes without corrupting the story.

use std::sync::Arc;

use backon::Retryable;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  broadcast::{Broadcast, STORY_TOPIC},
  leaderboard::{LeaderboardEntry, LeaderboardMaintainer},
  repository::{
    ArchiveSort, CURRENT_KEY, Outcome, StoryRepository, Transition,
  },
  resolver::{Decision, Round, RoundResolver, RoundWindow},
  settings::Settings,
  source::{CandidateSource, RoundTag},
  story::{Sentence, Story, StoryStatus, window_floor, window_start},
  store::StateStore,
};

// ─── Submission notices ──────────────────────────────────────────────────────

/// Why a submission notice was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
  TooShort,
  TooLong,
  RoundClosed,
}

/// The answer to a submission notice. Purely advisory: acceptance means
/// the text could win the round it targets, not that it will.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionOutcome {
  Accepted,
  Rejected { reason: RejectReason },
}

// ─── Manager ─────────────────────────────────────────────────────────────────

pub struct LifecycleManager<S, C, B> {
  repo:      Arc<StoryRepository<S>>,
  resolver:  RoundResolver<C>,
  ranking:   LeaderboardMaintainer<S>,
  broadcast: B,
  settings:  Arc<Settings>,
}

impl<S, C, B> LifecycleManager<S, C, B>
where
  S: StateStore,
  C: CandidateSource,
  B: Broadcast,
{
  pub fn new(
    repo: Arc<StoryRepository<S>>,
    source: C,
    broadcast: B,
    settings: Arc<Settings>,
  ) -> Self {
    Self {
      resolver: RoundResolver::new(source, settings.clone()),
      ranking: LeaderboardMaintainer::new(repo.clone(), settings.clone()),
      repo,
      broadcast,
      settings,
    }
  }

  pub fn settings(&self) -> &Settings { &self.settings }

  // ── Scheduled entry points ────────────────────────────────────────────

  /// Round tick: archive a finished story if one is seated, make sure a
  /// story exists, then resolve the most recent elapsed round window.
  pub async fn on_hourly_tick(&self) -> Result<()> {
    self.tick(Utc::now()).await
  }

  /// Maintenance tick: the archival sweep, an unconditional leaderboard
  /// rebuild (healing any staleness left behind by races or half-finished
  /// archivals), and a check that a story is seated at all.
  pub async fn on_daily_tick(&self) -> Result<()> {
    self.maintain(Utc::now()).await
  }

  /// [`on_hourly_tick`](Self::on_hourly_tick) with an explicit clock.
  pub async fn tick(&self, now: DateTime<Utc>) -> Result<()> {
    self.sweep_completed(now).await?;
    let story = self.ensure_story(now).await?;
    if !story.is_active() {
      // A racing tick finished the story between the sweep and here; the
      // next tick will archive it.
      debug!(story = %story.story_id, "story finished mid-tick");
      return Ok(());
    }
    self.resolve_round(&story, now).await
  }

  /// [`on_daily_tick`](Self::on_daily_tick) with an explicit clock.
  pub async fn maintain(&self, now: DateTime<Utc>) -> Result<()> {
    self.sweep_completed(now).await?;
    self.ranking.rebuild().await?;
    self.ensure_story(now).await?;
    Ok(())
  }

  // ── Round resolution ──────────────────────────────────────────────────

  async fn resolve_round(&self, story: &Story, now: DateTime<Utc>) -> Result<()> {
    let window_end = window_floor(now, self.settings.round_secs);
    if window_end <= story.resolved_through {
      debug!(
        story = %story.story_id,
        round = story.round_number,
        "window already settled"
      );
      return Ok(());
    }
    // Only the most recent elapsed window is resolved. Hours the scheduler
    // slept through produce no sentence; their candidates are never seen.
    let round = Round {
      tag:    RoundTag {
        story_id:     story.story_id,
        round_number: story.round_number,
      },
      window: RoundWindow {
        start: window_start(window_end, self.settings.round_secs),
        end:   window_end,
      },
    };

    let fetch = || async move {
      self.resolver.resolve(&round, now).await.map_err(Error::from)
    };
    let decision = fetch
      .retry(self.settings.retry.backoff())
      .when(Error::is_transient)
      .notify(|err, delay| {
        warn!(error = %err, ?delay, "candidate fetch failed, backing off");
      })
      .await?;

    let sentence = match decision {
      Decision::Append(winner) => Sentence {
        text:        winner.text,
        author:      winner.submitter_id,
        score:       winner.score,
        appended_at: window_end,
      },
      Decision::Fallback => {
        info!(
          story = %story.story_id,
          round = round.tag.round_number,
          "no valid candidate, appending fallback"
        );
        Sentence {
          text:        self.settings.fallback_text.clone(),
          author:      self.settings.system_submitter.clone(),
          score:       0,
          appended_at: window_end,
        }
      }
      Decision::NotElapsed => return Ok(()),
    };

    let append = || {
      let sentence = sentence.clone();
      async move {
        self
          .repo
          .update_current(|current| {
            let Some(current) = current else { return Transition::Noop };
            // Re-checked on every attempt: a racing tick may have settled
            // this window, completed the story, or swapped it out.
            let still_open = current.is_active()
              && current.story_id == round.tag.story_id
              && current.round_number == round.tag.round_number
              && current.resolved_through < window_end;
            if !still_open {
              return Transition::Noop;
            }
            Transition::Write(current.with_appended(
              sentence.clone(),
              window_end,
              self.settings.story_length,
            ))
          })
          .await
      }
    };
    let outcome = append
      .retry(self.settings.retry.backoff())
      .when(Error::is_transient)
      .notify(|err, delay| {
        warn!(error = %err, ?delay, "append failed, backing off");
      })
      .await?;

    match outcome {
      Outcome::Written(updated) => {
        info!(
          story = %updated.story_id,
          round = round.tag.round_number,
          sentences = updated.sentence_count(),
          author = %sentence.author,
          score = sentence.score,
          "round resolved"
        );
        self
          .publish(json!({
            "event":          "sentence.appended",
            "story_id":       updated.story_id,
            "round_number":   round.tag.round_number,
            "sentence":       sentence.text,
            "author":         sentence.author,
            "sentence_count": updated.sentence_count(),
          }))
          .await;
        if updated.status == StoryStatus::Completed {
          info!(
            story = %updated.story_id,
            votes = updated.total_votes,
            "story completed"
          );
          self
            .publish(json!({
              "event":       "story.completed",
              "story_id":    updated.story_id,
              "total_votes": updated.total_votes,
            }))
            .await;
        }
      }
      Outcome::Unchanged(_) => {
        debug!(
          story = %story.story_id,
          round = round.tag.round_number,
          "another tick settled this window first"
        );
      }
    }
    Ok(())
  }

  // ── Story turnover ────────────────────────────────────────────────────

  /// Completed → Archived, then seat a fresh story in the same conditional
  /// write that unseats the finished one, so readers never observe an
  /// empty slot between stories. Every step tolerates having already been
  /// done by an earlier tick that died partway.
  async fn sweep_completed(&self, now: DateTime<Utc>) -> Result<()> {
    let Some(story) = self.repo.load_current().await? else {
      return Ok(());
    };
    match story.status {
      StoryStatus::Active => return Ok(()),
      StoryStatus::Archived => {
        return Err(Error::Corrupt {
          key:    CURRENT_KEY.to_owned(),
          reason: "an archived story is seated as current".into(),
        });
      }
      StoryStatus::Completed => {}
    }

    let entry = self.repo.archive(&story).await?;
    self.ranking.rebuild().await?;

    let successor = Story::new(now, self.settings.round_secs);
    let outcome = self
      .repo
      .update_current(|current| match current {
        Some(current)
          if current.story_id == story.story_id
            && current.status == StoryStatus::Completed =>
        {
          Transition::Write(successor.clone())
        }
        _ => Transition::Noop,
      })
      .await?;

    match outcome {
      Outcome::Written(fresh) => {
        info!(
          archived = %story.story_id,
          votes = story.total_votes,
          story = %fresh.story_id,
          "story archived, fresh story started"
        );
        self
          .publish(json!({
            "event":          "story.archived",
            "story_id":       story.story_id,
            "total_votes":    story.total_votes,
            "sentence_count": entry.sentence_count,
          }))
          .await;
        self
          .publish(json!({
            "event":    "story.started",
            "story_id": fresh.story_id,
          }))
          .await;
      }
      Outcome::Unchanged(_) => {
        debug!(
          story = %story.story_id,
          "successor already seated by another tick"
        );
      }
    }
    Ok(())
  }

  /// The current story, seating a brand-new one when the slot is empty.
  async fn ensure_story(&self, now: DateTime<Utc>) -> Result<Story> {
    if let Some(story) = self.repo.load_current().await? {
      return Ok(story);
    }
    let seed = Story::new(now, self.settings.round_secs);
    let outcome = self
      .repo
      .update_current(|current| match current {
        None => Transition::Write(seed.clone()),
        Some(_) => Transition::Noop,
      })
      .await?;
    match outcome {
      Outcome::Written(story) => {
        info!(story = %story.story_id, "story started");
        self
          .publish(json!({
            "event":    "story.started",
            "story_id": story.story_id,
          }))
          .await;
        Ok(story)
      }
      // Lost the creation race; whoever won seated a story.
      Outcome::Unchanged(Some(story)) => Ok(story),
      Outcome::Unchanged(None) => Err(Error::Contention {
        key:      CURRENT_KEY.to_owned(),
        attempts: self.settings.cas_attempts,
      }),
    }
  }

  // ── Submission notices ────────────────────────────────────────────────

  /// Screen a submission notice against the currently open round. Nothing
  /// is persisted: candidates live in the external surface until a round
  /// resolves. Length is checked before round targeting, so an oversized
  /// submission to a stale round hears about its size.
  pub async fn submit_notice(
    &self,
    story_id: Uuid,
    round_number: u32,
    text: &str,
  ) -> Result<SubmissionOutcome> {
    let chars = text.trim().chars().count();
    if chars < self.settings.min_sentence_chars {
      return Ok(SubmissionOutcome::Rejected {
        reason: RejectReason::TooShort,
      });
    }
    if chars > self.settings.max_sentence_chars {
      return Ok(SubmissionOutcome::Rejected {
        reason: RejectReason::TooLong,
      });
    }
    let open = self.repo.load_current().await?.is_some_and(|story| {
      story.is_active()
        && story.story_id == story_id
        && story.round_number == round_number
    });
    if open {
      Ok(SubmissionOutcome::Accepted)
    } else {
      Ok(SubmissionOutcome::Rejected { reason: RejectReason::RoundClosed })
    }
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  /// The current story plus the seconds left until the next round
  /// boundary.
  pub async fn current_story(
    &self,
    now: DateTime<Utc>,
  ) -> Result<Option<(Story, i64)>> {
    let Some(story) = self.repo.load_current().await? else {
      return Ok(None);
    };
    let period = self.settings.round_secs.max(1) as i64;
    let next_boundary =
      window_floor(now, self.settings.round_secs) + Duration::seconds(period);
    Ok(Some((story, (next_boundary - now).num_seconds())))
  }

  pub async fn leaderboard(&self, top: usize) -> Result<Vec<LeaderboardEntry>> {
    self.ranking.top(top).await
  }

  pub async fn list_archive(
    &self,
    page: usize,
    page_size: usize,
    sort: ArchiveSort,
  ) -> Result<(Vec<Story>, usize)> {
    self.repo.list_archive(page, page_size, sort).await
  }

  /// Fire-and-forget: a lost event never blocks or fails a transition.
  async fn publish(&self, payload: serde_json::Value) {
    if let Err(err) = self.broadcast.publish(STORY_TOPIC, payload).await {
      warn!(error = %err, "event broadcast failed");
    }
  }
}
