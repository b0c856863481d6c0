//! The story repository — the only module that touches persisted records.
//!
//! The backing store offers nothing beyond per-key version tokens, so atomic
//! read-modify-write is emulated here: load the record, run the caller's
//! transition function against the snapshot, and write back conditioned on
//! the version still matching. A conflict means somebody else moved the
//! story first; the loop reloads and asks the transition function again,
//! up to a bounded number of attempts.
//!
//! Records that fail decoding or violate a story invariant are reported as
//! corrupt and never repaired in place. An operator moves them aside with
//! [`StoryRepository::quarantine_current`].

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  leaderboard::{LeaderboardEntry, rank_ordering},
  settings::Settings,
  store::{Cas, StateStore},
  story::{Story, StoryStatus},
};

// ─── Key layout ──────────────────────────────────────────────────────────────

pub(crate) const CURRENT_KEY: &str = "story/current";
pub(crate) const INDEX_KEY: &str = "story/archive/index";
pub(crate) const LEADERBOARD_KEY: &str = "story/leaderboard";

fn archive_key(story_id: Uuid) -> String {
  format!("story/archive/{story_id}")
}

fn quarantine_key(at: DateTime<Utc>) -> String {
  format!("story/quarantine/{}", at.to_rfc3339_opts(SecondsFormat::Secs, true))
}

// ─── Archive index ───────────────────────────────────────────────────────────

/// Number of characters of the opening sentence kept in the index.
pub const PREVIEW_MAX_CHARS: usize = 100;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// One line of the archive index: everything a listing or leaderboard needs
/// without loading the full story record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveIndexEntry {
  pub story_id:       Uuid,
  pub completed_at:   DateTime<Utc>,
  pub total_votes:    i64,
  pub sentence_count: usize,
  /// Author of the opening sentence.
  pub creator:        String,
  /// Opening sentence, truncated for display.
  pub preview:        String,
}

impl ArchiveIndexEntry {
  pub fn from_story(story: &Story, fallback_creator: &str) -> Self {
    let opening = story.sentences.first();
    let creator = opening
      .map(|s| s.author.clone())
      .unwrap_or_else(|| fallback_creator.to_owned());
    let full = opening.map(|s| s.text.as_str()).unwrap_or("");
    let mut preview: String = full.chars().take(PREVIEW_MAX_CHARS).collect();
    if full.chars().count() > PREVIEW_MAX_CHARS {
      preview.push('…');
    }
    Self {
      story_id: story.story_id,
      completed_at: story.completed_at.unwrap_or(story.created_at),
      total_votes: story.total_votes,
      sentence_count: story.sentence_count(),
      creator,
      preview,
    }
  }
}

/// Orderings the archive listing can be served in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveSort {
  /// Most recently completed first.
  #[default]
  Date,
  /// Leaderboard order: most votes first, older completion breaking ties.
  Votes,
}

// ─── Transitions ─────────────────────────────────────────────────────────────

/// What a transition function wants done with the current record.
#[derive(Debug, Clone)]
pub enum Transition {
  /// Persist this story as the new current record.
  Write(Story),
  /// Leave the record alone; the precondition the caller cared about no
  /// longer holds on this snapshot.
  Noop,
}

/// What an atomic update actually did.
#[derive(Debug, Clone)]
pub enum Outcome {
  /// The transition landed; this story is now the current record.
  Written(Story),
  /// The transition function declined on the snapshot it was shown.
  Unchanged(Option<Story>),
}

impl Outcome {
  pub fn written(&self) -> Option<&Story> {
    match self {
      Outcome::Written(story) => Some(story),
      Outcome::Unchanged(_) => None,
    }
  }
}

// ─── Repository ──────────────────────────────────────────────────────────────

pub struct StoryRepository<S> {
  store:    S,
  settings: Arc<Settings>,
}

impl<S: StateStore> StoryRepository<S> {
  pub fn new(store: S, settings: Arc<Settings>) -> Self {
    Self { store, settings }
  }

  /// Decode and invariant-check a story record.
  async fn load_story(&self, key: &str) -> Result<Option<(Story, u64)>> {
    let Some(record) = self.store.get(key).await.map_err(Error::store)? else {
      return Ok(None);
    };
    let story: Story =
      serde_json::from_slice(&record.bytes).map_err(|e| Error::Corrupt {
        key:    key.to_owned(),
        reason: format!("undecodable story record: {e}"),
      })?;
    story
      .check_invariants(self.settings.story_length)
      .map_err(|reason| Error::Corrupt { key: key.to_owned(), reason })?;
    Ok(Some((story, record.version)))
  }

  pub async fn load_current(&self) -> Result<Option<Story>> {
    Ok(self.load_story(CURRENT_KEY).await?.map(|(story, _)| story))
  }

  /// Atomic read-modify-write of the current record.
  ///
  /// `f` sees the freshest snapshot (or `None` when no story is seated) on
  /// every attempt. Returned writes are invariant-checked and screened for
  /// transition legality before the conditional write; a version conflict
  /// reloads and re-runs `f`. Exhausting `cas_attempts` is an error.
  pub async fn update_current<F>(&self, mut f: F) -> Result<Outcome>
  where F: FnMut(Option<&Story>) -> Transition {
    for attempt in 1..=self.settings.cas_attempts {
      let loaded = self.load_story(CURRENT_KEY).await?;
      let snapshot = loaded.as_ref().map(|(story, _)| story);
      let next = match f(snapshot) {
        Transition::Noop => {
          return Ok(Outcome::Unchanged(loaded.map(|(story, _)| story)));
        }
        Transition::Write(next) => next,
      };
      next
        .check_invariants(self.settings.story_length)
        .map_err(|reason| Error::Transition { reason })?;
      check_transition(snapshot, &next)?;
      let bytes = serde_json::to_vec(&next)?;
      let expected = loaded.as_ref().map(|(_, version)| *version);
      match self
        .store
        .put_if_version(CURRENT_KEY, bytes, expected)
        .await
        .map_err(Error::store)?
      {
        Cas::Stored(_) => return Ok(Outcome::Written(next)),
        Cas::Conflict => {
          debug!(key = CURRENT_KEY, attempt, "version conflict, reloading");
        }
      }
    }
    Err(Error::Contention {
      key:      CURRENT_KEY.to_owned(),
      attempts: self.settings.cas_attempts,
    })
  }

  // ── Archive ───────────────────────────────────────────────────────────

  /// File a completed story in the archive and index it.
  ///
  /// Both steps are idempotent: the record write is create-only, and the
  /// index append skips ids it already holds, so a tick that died between
  /// steps is finished by the next one.
  pub async fn archive(&self, story: &Story) -> Result<ArchiveIndexEntry> {
    if story.status != StoryStatus::Completed {
      return Err(Error::Transition {
        reason: format!(
          "only completed stories can be archived, got {:?}",
          story.status
        ),
      });
    }
    let key = archive_key(story.story_id);
    let mut archived = story.clone();
    archived.status = StoryStatus::Archived;
    let bytes = serde_json::to_vec(&archived)?;
    match self
      .store
      .put_if_version(&key, bytes, None)
      .await
      .map_err(Error::store)?
    {
      Cas::Stored(_) => {}
      Cas::Conflict => {
        debug!(story = %story.story_id, "archive record already written");
      }
    }
    let entry = ArchiveIndexEntry::from_story(
      &archived,
      &self.settings.system_submitter,
    );
    self.index_append(&entry).await?;
    Ok(entry)
  }

  /// Append one entry to the archive index unless its id is already there.
  async fn index_append(&self, entry: &ArchiveIndexEntry) -> Result<()> {
    for attempt in 1..=self.settings.cas_attempts {
      let loaded = self.store.get(INDEX_KEY).await.map_err(Error::store)?;
      let (mut entries, expected) = match &loaded {
        Some(record) => {
          let entries: Vec<ArchiveIndexEntry> =
            serde_json::from_slice(&record.bytes).map_err(|e| {
              Error::Corrupt {
                key:    INDEX_KEY.to_owned(),
                reason: format!("undecodable archive index: {e}"),
              }
            })?;
          (entries, Some(record.version))
        }
        None => (Vec::new(), None),
      };
      if entries.iter().any(|e| e.story_id == entry.story_id) {
        return Ok(());
      }
      entries.push(entry.clone());
      let bytes = serde_json::to_vec(&entries)?;
      match self
        .store
        .put_if_version(INDEX_KEY, bytes, expected)
        .await
        .map_err(Error::store)?
      {
        Cas::Stored(_) => return Ok(()),
        Cas::Conflict => {
          debug!(key = INDEX_KEY, attempt, "version conflict, reloading");
        }
      }
    }
    Err(Error::Contention {
      key:      INDEX_KEY.to_owned(),
      attempts: self.settings.cas_attempts,
    })
  }

  pub async fn archive_index(&self) -> Result<Vec<ArchiveIndexEntry>> {
    let Some(record) =
      self.store.get(INDEX_KEY).await.map_err(Error::store)?
    else {
      return Ok(Vec::new());
    };
    serde_json::from_slice(&record.bytes).map_err(|e| Error::Corrupt {
      key:    INDEX_KEY.to_owned(),
      reason: format!("undecodable archive index: {e}"),
    })
  }

  pub async fn archived_story(&self, story_id: Uuid) -> Result<Option<Story>> {
    Ok(
      self
        .load_story(&archive_key(story_id))
        .await?
        .map(|(story, _)| story),
    )
  }

  /// One page of archived stories plus the total page count. Pages are
  /// 1-based; a page past the end is an empty list, not an error.
  pub async fn list_archive(
    &self,
    page: usize,
    page_size: usize,
    sort: ArchiveSort,
  ) -> Result<(Vec<Story>, usize)> {
    let mut index = self.archive_index().await?;
    match sort {
      ArchiveSort::Date => {
        index.sort_by(|a, b| {
          b.completed_at
            .cmp(&a.completed_at)
            .then(a.story_id.cmp(&b.story_id))
        });
      }
      ArchiveSort::Votes => index.sort_by(rank_ordering),
    }
    let page = page.max(1);
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let total_pages = index.len().div_ceil(page_size);
    let mut stories = Vec::new();
    for entry in index.iter().skip((page - 1) * page_size).take(page_size) {
      match self.archived_story(entry.story_id).await? {
        Some(story) => stories.push(story),
        // An index entry without its record means an interrupted archival
        // that never finished; surface it in the logs, keep serving.
        None => warn!(
          story = %entry.story_id,
          "archive index references a missing story record"
        ),
      }
    }
    Ok((stories, total_pages))
  }

  // ── Leaderboard record ────────────────────────────────────────────────

  /// The persisted leaderboard is a pure derivation of the archive index,
  /// so it is written unconditionally: concurrent rebuilds race benignly
  /// and the next rebuild converges on the full index either way.
  pub(crate) async fn save_leaderboard(
    &self,
    entries: &[LeaderboardEntry],
  ) -> Result<()> {
    let bytes = serde_json::to_vec(entries)?;
    self
      .store
      .put(LEADERBOARD_KEY, bytes, None)
      .await
      .map_err(Error::store)
  }

  pub(crate) async fn load_leaderboard(
    &self,
  ) -> Result<Option<Vec<LeaderboardEntry>>> {
    let Some(record) =
      self.store.get(LEADERBOARD_KEY).await.map_err(Error::store)?
    else {
      return Ok(None);
    };
    let entries =
      serde_json::from_slice(&record.bytes).map_err(|e| Error::Corrupt {
        key:    LEADERBOARD_KEY.to_owned(),
        reason: format!("undecodable leaderboard record: {e}"),
      })?;
    Ok(Some(entries))
  }

  // ── Quarantine ────────────────────────────────────────────────────────

  /// Move the current record aside for manual inspection, byte for byte,
  /// and clear the key. Returns the quarantine key, or `None` when there
  /// is nothing seated. The next tick starts a fresh story.
  pub async fn quarantine_current(
    &self,
    now: DateTime<Utc>,
  ) -> Result<Option<String>> {
    let Some(record) =
      self.store.get(CURRENT_KEY).await.map_err(Error::store)?
    else {
      return Ok(None);
    };
    let key = quarantine_key(now);
    self
      .store
      .put(&key, record.bytes, None)
      .await
      .map_err(Error::store)?;
    self.store.delete(CURRENT_KEY).await.map_err(Error::store)?;
    warn!(key = %key, "current story record quarantined");
    Ok(Some(key))
  }
}

// ─── Transition legality ─────────────────────────────────────────────────────

/// Screen a proposed write against the previous snapshot. Invariants of the
/// new state are checked separately; this guards the step between states.
fn check_transition(prev: Option<&Story>, next: &Story) -> Result<()> {
  let illegal = |reason: String| Err(Error::Transition { reason });
  let Some(prev) = prev else {
    if next.status != StoryStatus::Active {
      return illegal(format!(
        "cannot seat a {:?} story on an empty slot",
        next.status
      ));
    }
    return Ok(());
  };
  match (prev.status, next.status) {
    (StoryStatus::Active, StoryStatus::Active)
    | (StoryStatus::Active, StoryStatus::Completed) => {
      if next.story_id != prev.story_id {
        return illegal("an active story can only be replaced once it completes".into());
      }
      if next.created_at != prev.created_at {
        return illegal("creation timestamp is immutable".into());
      }
      if next.sentence_count() < prev.sentence_count() {
        return illegal("sentences are append-only".into());
      }
      if next.resolved_through < prev.resolved_through {
        return illegal("resolution fence cannot move backwards".into());
      }
      Ok(())
    }
    (StoryStatus::Completed, StoryStatus::Active) => {
      if next.story_id == prev.story_id {
        return illegal("a completed story cannot reactivate".into());
      }
      Ok(())
    }
    (from, to) => illegal(format!(
      "no {from:?} → {to:?} transition exists for the current record"
    )),
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
  };

  use chrono::{Duration, TimeZone};

  use super::*;
  use crate::{
    mock::{MemoryStore, MemoryStoreError},
    story::Sentence,
    store::Versioned,
  };

  fn settings() -> Arc<Settings> {
    Arc::new(Settings { story_length: 3, ..Settings::default() })
  }

  fn at(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, h, 0, 0).unwrap()
  }

  fn sentence(author: &str, score: i64, end: DateTime<Utc>) -> Sentence {
    Sentence {
      text: "Something happened in the village.".into(),
      author: author.into(),
      score,
      appended_at: end,
    }
  }

  fn completed_story(votes: i64, completed: DateTime<Utc>) -> Story {
    let mut story = Story::new(completed - Duration::hours(4), 3600);
    for i in (0..3).rev() {
      let end = completed - Duration::hours(i);
      story = story.with_appended(sentence("ada", votes / 3, end), end, 3);
    }
    story.total_votes = votes;
    let spread = votes - (votes / 3) * 3;
    story.sentences[0].score += spread;
    story
  }

  fn repo(store: MemoryStore) -> StoryRepository<MemoryStore> {
    StoryRepository::new(store, settings())
  }

  #[tokio::test]
  async fn update_seats_a_story_on_an_empty_slot() {
    let repo = repo(MemoryStore::new());
    let outcome = repo
      .update_current(|current| {
        assert!(current.is_none());
        Transition::Write(Story::new(at(10), 3600))
      })
      .await
      .unwrap();
    assert!(outcome.written().is_some());
    assert!(repo.load_current().await.unwrap().is_some());
  }

  #[tokio::test]
  async fn noop_leaves_the_record_untouched() {
    let store = MemoryStore::new();
    let repo = repo(store.clone());
    let story = Story::new(at(10), 3600);
    repo
      .update_current(|_| Transition::Write(story.clone()))
      .await
      .unwrap();
    let before = store.get(CURRENT_KEY).await.unwrap().unwrap();

    let outcome = repo.update_current(|_| Transition::Noop).await.unwrap();
    match outcome {
      Outcome::Unchanged(Some(seen)) => {
        assert_eq!(seen.story_id, story.story_id);
      }
      other => panic!("expected an unchanged outcome, got {other:?}"),
    }
    let after = store.get(CURRENT_KEY).await.unwrap().unwrap();
    assert_eq!(before.version, after.version);
  }

  /// Store wrapper that answers the first `remaining` conditional writes
  /// with a conflict, regardless of versions.
  #[derive(Clone)]
  struct Contended {
    inner:     MemoryStore,
    remaining: Arc<AtomicU32>,
  }

  impl StateStore for Contended {
    type Error = MemoryStoreError;

    async fn get(&self, key: &str) -> Result<Option<Versioned>, Self::Error> {
      self.inner.get(key).await
    }

    async fn put(
      &self,
      key: &str,
      bytes: Vec<u8>,
      expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), Self::Error> {
      self.inner.put(key, bytes, expires_at).await
    }

    async fn put_if_version(
      &self,
      key: &str,
      bytes: Vec<u8>,
      expected: Option<u64>,
    ) -> Result<Cas, Self::Error> {
      let inject = self
        .remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
      if inject {
        return Ok(Cas::Conflict);
      }
      self.inner.put_if_version(key, bytes, expected).await
    }

    async fn delete(&self, key: &str) -> Result<(), Self::Error> {
      self.inner.delete(key).await
    }
  }

  #[tokio::test]
  async fn conflicts_are_retried_with_fresh_reads() {
    let store = Contended {
      inner:     MemoryStore::new(),
      remaining: Arc::new(AtomicU32::new(2)),
    };
    let repo = StoryRepository::new(store, settings());
    let calls = AtomicU32::new(0);
    let outcome = repo
      .update_current(|_| {
        calls.fetch_add(1, Ordering::SeqCst);
        Transition::Write(Story::new(at(10), 3600))
      })
      .await
      .unwrap();
    assert!(outcome.written().is_some());
    // Two conflicted attempts plus the one that landed.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn exhausted_attempts_surface_as_contention() {
    let store = Contended {
      inner:     MemoryStore::new(),
      remaining: Arc::new(AtomicU32::new(u32::MAX)),
    };
    let repo = StoryRepository::new(store, settings());
    let err = repo
      .update_current(|_| Transition::Write(Story::new(at(10), 3600)))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Contention { attempts: 5, .. }));
  }

  #[tokio::test]
  async fn undecodable_current_record_is_corrupt() {
    let store = MemoryStore::new();
    store
      .put(CURRENT_KEY, b"not a story".to_vec(), None)
      .await
      .unwrap();
    let repo = repo(store);
    let err = repo.load_current().await.unwrap_err();
    assert!(matches!(err, Error::Corrupt { .. }), "{err}");
    assert!(!err.is_transient());
  }

  #[tokio::test]
  async fn invariant_violations_in_stored_records_are_corrupt() {
    let store = MemoryStore::new();
    let mut story = Story::new(at(10), 3600);
    story.round_number = 7;
    store
      .put(CURRENT_KEY, serde_json::to_vec(&story).unwrap(), None)
      .await
      .unwrap();
    let repo = repo(store);
    let err = repo.load_current().await.unwrap_err();
    assert!(matches!(err, Error::Corrupt { .. }));
  }

  #[tokio::test]
  async fn active_story_cannot_be_replaced_by_a_different_one() {
    let repo = repo(MemoryStore::new());
    repo
      .update_current(|_| Transition::Write(Story::new(at(10), 3600)))
      .await
      .unwrap();
    let err = repo
      .update_current(|_| Transition::Write(Story::new(at(11), 3600)))
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Transition { .. }));
  }

  #[tokio::test]
  async fn archive_is_idempotent() {
    let repo = repo(MemoryStore::new());
    let story = completed_story(9, at(14));

    let first = repo.archive(&story).await.unwrap();
    let second = repo.archive(&story).await.unwrap();
    assert_eq!(first, second);

    let index = repo.archive_index().await.unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(index[0].story_id, story.story_id);
    assert_eq!(index[0].total_votes, 9);
    assert_eq!(index[0].creator, "ada");

    let archived = repo.archived_story(story.story_id).await.unwrap().unwrap();
    assert_eq!(archived.status, StoryStatus::Archived);
  }

  #[tokio::test]
  async fn archiving_an_active_story_is_rejected() {
    let repo = repo(MemoryStore::new());
    let err = repo.archive(&Story::new(at(10), 3600)).await.unwrap_err();
    assert!(matches!(err, Error::Transition { .. }));
  }

  #[tokio::test]
  async fn archive_listing_sorts_and_paginates() {
    let repo = repo(MemoryStore::new());
    let early = completed_story(5, at(10));
    let middle = completed_story(20, at(12));
    let late = completed_story(11, at(14));
    for story in [&early, &middle, &late] {
      repo.archive(story).await.unwrap();
    }

    let (by_date, pages) =
      repo.list_archive(1, 10, ArchiveSort::Date).await.unwrap();
    assert_eq!(pages, 1);
    let ids: Vec<_> = by_date.iter().map(|s| s.story_id).collect();
    assert_eq!(ids, vec![late.story_id, middle.story_id, early.story_id]);

    let (by_votes, _) =
      repo.list_archive(1, 10, ArchiveSort::Votes).await.unwrap();
    let ids: Vec<_> = by_votes.iter().map(|s| s.story_id).collect();
    assert_eq!(ids, vec![middle.story_id, late.story_id, early.story_id]);

    let (page_two, pages) =
      repo.list_archive(2, 2, ArchiveSort::Date).await.unwrap();
    assert_eq!(pages, 2);
    assert_eq!(page_two.len(), 1);
    assert_eq!(page_two[0].story_id, early.story_id);

    let (past_end, _) =
      repo.list_archive(9, 2, ArchiveSort::Date).await.unwrap();
    assert!(past_end.is_empty());
  }

  #[tokio::test]
  async fn quarantine_moves_the_record_aside() {
    let store = MemoryStore::new();
    store
      .put(CURRENT_KEY, b"garbage bytes".to_vec(), None)
      .await
      .unwrap();
    let repo = repo(store.clone());

    let key = repo.quarantine_current(at(15)).await.unwrap().unwrap();
    assert!(key.starts_with("story/quarantine/"));
    assert!(store.get(CURRENT_KEY).await.unwrap().is_none());
    let parked = store.get(&key).await.unwrap().unwrap();
    assert_eq!(parked.bytes, b"garbage bytes");

    // Nothing seated now, so a second call is a no-op.
    assert!(repo.quarantine_current(at(16)).await.unwrap().is_none());
  }
}
