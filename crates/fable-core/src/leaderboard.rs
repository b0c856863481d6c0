//! The leaderboard — a derived ranking over archived stories.
//!
//! Never the source of truth: the persisted record is rebuilt from the
//! archive index whenever a story is archived and again on every
//! maintenance tick, so losing it costs nothing but a rebuild. Reads go
//! through a small TTL cache owned by the maintainer; the rebuild path
//! invalidates it, so in-process readers see a fresh archival immediately
//! and other processes catch up within the TTL.

use std::{cmp::Ordering, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{
  Result,
  repository::{ArchiveIndexEntry, StoryRepository},
  settings::Settings,
  store::StateStore,
};

const CACHE_KEY: &str = "top";
const CACHE_TTL: Duration = Duration::from_secs(30);

// ─── Entries ─────────────────────────────────────────────────────────────────

/// One ranked line of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
  /// 1-based, dense.
  pub rank:           u32,
  pub story_id:       Uuid,
  pub total_votes:    i64,
  pub sentence_count: usize,
  pub creator:        String,
  pub completed_at:   DateTime<Utc>,
  pub preview:        String,
}

/// Leaderboard order: most votes first; at equal votes the story that
/// completed earlier ranks higher; ids break exact ties so the order is
/// total.
pub fn rank_ordering(a: &ArchiveIndexEntry, b: &ArchiveIndexEntry) -> Ordering {
  b.total_votes
    .cmp(&a.total_votes)
    .then(a.completed_at.cmp(&b.completed_at))
    .then(a.story_id.cmp(&b.story_id))
}

/// Rank the index and keep the top `n`.
pub fn rank(index: &[ArchiveIndexEntry], n: usize) -> Vec<LeaderboardEntry> {
  let mut sorted: Vec<&ArchiveIndexEntry> = index.iter().collect();
  sorted.sort_by(|a, b| rank_ordering(a, b));
  sorted
    .into_iter()
    .take(n)
    .enumerate()
    .map(|(i, entry)| LeaderboardEntry {
      rank:           i as u32 + 1,
      story_id:       entry.story_id,
      total_votes:    entry.total_votes,
      sentence_count: entry.sentence_count,
      creator:        entry.creator.clone(),
      completed_at:   entry.completed_at,
      preview:        entry.preview.clone(),
    })
    .collect()
}

// ─── Maintainer ──────────────────────────────────────────────────────────────

pub struct LeaderboardMaintainer<S> {
  repo:     Arc<StoryRepository<S>>,
  settings: Arc<Settings>,
  cache:    Cache<&'static str, Arc<Vec<LeaderboardEntry>>>,
}

impl<S: StateStore> LeaderboardMaintainer<S> {
  pub fn new(repo: Arc<StoryRepository<S>>, settings: Arc<Settings>) -> Self {
    let cache = Cache::builder()
      .max_capacity(1)
      .time_to_live(CACHE_TTL)
      .build();
    Self { repo, settings, cache }
  }

  /// Recompute the persisted leaderboard from the archive index and drop
  /// the cached copy.
  pub async fn rebuild(&self) -> Result<Vec<LeaderboardEntry>> {
    let index = self.repo.archive_index().await?;
    let entries = rank(&index, self.settings.leaderboard_size);
    self.repo.save_leaderboard(&entries).await?;
    self.cache.invalidate(&CACHE_KEY).await;
    info!(
      entries = entries.len(),
      archived = index.len(),
      "leaderboard rebuilt"
    );
    Ok(entries)
  }

  /// The top `n` entries, served from cache when warm. A missing persisted
  /// record (first run, or a wiped store) triggers a rebuild instead of an
  /// error.
  pub async fn top(&self, n: usize) -> Result<Vec<LeaderboardEntry>> {
    let full = match self.cache.get(&CACHE_KEY).await {
      Some(hit) => hit,
      None => {
        let entries = match self.repo.load_leaderboard().await? {
          Some(entries) => entries,
          None => self.rebuild().await?,
        };
        let entries = Arc::new(entries);
        self.cache.insert(CACHE_KEY, entries.clone()).await;
        entries
      }
    };
    Ok(full.iter().take(n).cloned().collect())
  }
}
