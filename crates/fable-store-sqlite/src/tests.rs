//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::Arc;

use chrono::{Duration, Utc};
use fable_core::{
  repository::{StoryRepository, Transition},
  settings::Settings,
  story::Story,
  store::{Cas, StateStore},
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn get_missing_returns_none() {
  let s = store().await;
  let record = s.get("story/current").await.unwrap();
  assert!(record.is_none());
}

#[tokio::test]
async fn put_then_get_roundtrip() {
  let s = store().await;

  s.put("story/current", b"once upon a time".to_vec(), None)
    .await
    .unwrap();

  let record = s.get("story/current").await.unwrap().unwrap();
  assert_eq!(record.bytes, b"once upon a time");
  assert_eq!(record.version, 1);
}

#[tokio::test]
async fn overwrite_bumps_version() {
  let s = store().await;

  s.put("story/leaderboard", b"[]".to_vec(), None)
    .await
    .unwrap();
  s.put("story/leaderboard", b"[1]".to_vec(), None)
    .await
    .unwrap();

  let record = s.get("story/leaderboard").await.unwrap().unwrap();
  assert_eq!(record.bytes, b"[1]");
  assert_eq!(record.version, 2);
}

#[tokio::test]
async fn delete_clears_the_record() {
  let s = store().await;

  s.put("story/current", b"x".to_vec(), None).await.unwrap();
  s.delete("story/current").await.unwrap();

  assert!(s.get("story/current").await.unwrap().is_none());
}

#[tokio::test]
async fn delete_missing_is_a_noop() {
  let s = store().await;
  s.delete("story/current").await.unwrap();
}

// ─── Conditional writes ──────────────────────────────────────────────────────

#[tokio::test]
async fn conditional_create_when_absent() {
  let s = store().await;

  let outcome = s
    .put_if_version("story/current", b"seed".to_vec(), None)
    .await
    .unwrap();
  assert_eq!(outcome, Cas::Stored(1));

  let record = s.get("story/current").await.unwrap().unwrap();
  assert_eq!(record.bytes, b"seed");
  assert_eq!(record.version, 1);
}

#[tokio::test]
async fn conditional_create_conflicts_when_present() {
  let s = store().await;

  s.put("story/current", b"taken".to_vec(), None)
    .await
    .unwrap();
  let outcome = s
    .put_if_version("story/current", b"late".to_vec(), None)
    .await
    .unwrap();

  assert_eq!(outcome, Cas::Conflict);
  let record = s.get("story/current").await.unwrap().unwrap();
  assert_eq!(record.bytes, b"taken");
}

#[tokio::test]
async fn conditional_replace_with_matching_version() {
  let s = store().await;

  s.put("story/current", b"v1".to_vec(), None).await.unwrap();
  let outcome = s
    .put_if_version("story/current", b"v2".to_vec(), Some(1))
    .await
    .unwrap();

  assert_eq!(outcome, Cas::Stored(2));
  let record = s.get("story/current").await.unwrap().unwrap();
  assert_eq!(record.bytes, b"v2");
  assert_eq!(record.version, 2);
}

#[tokio::test]
async fn stale_version_conflicts_and_leaves_the_record() {
  let s = store().await;

  s.put("story/current", b"v1".to_vec(), None).await.unwrap();
  s.put("story/current", b"v2".to_vec(), None).await.unwrap();

  let outcome = s
    .put_if_version("story/current", b"stale".to_vec(), Some(1))
    .await
    .unwrap();

  assert_eq!(outcome, Cas::Conflict);
  let record = s.get("story/current").await.unwrap().unwrap();
  assert_eq!(record.bytes, b"v2");
  assert_eq!(record.version, 2);
}

#[tokio::test]
async fn conditional_replace_of_missing_key_conflicts() {
  let s = store().await;

  let outcome = s
    .put_if_version("story/current", b"ghost".to_vec(), Some(1))
    .await
    .unwrap();

  assert_eq!(outcome, Cas::Conflict);
  assert!(s.get("story/current").await.unwrap().is_none());
}

#[tokio::test]
async fn concurrent_creators_store_exactly_once() {
  let s = store().await;

  let (a, b) = tokio::join!(
    s.put_if_version("story/current", b"first".to_vec(), None),
    s.put_if_version("story/current", b"second".to_vec(), None),
  );

  let stored = [a.unwrap(), b.unwrap()]
    .iter()
    .filter(|outcome| !outcome.is_conflict())
    .count();
  assert_eq!(stored, 1);
  assert_eq!(s.get("story/current").await.unwrap().unwrap().version, 1);
}

// ─── Expiry ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn expired_record_reads_as_missing() {
  let s = store().await;

  let past = Utc::now() - Duration::seconds(5);
  s.put("quarantine/old", b"stale".to_vec(), Some(past))
    .await
    .unwrap();

  assert!(s.get("quarantine/old").await.unwrap().is_none());
}

#[tokio::test]
async fn future_expiry_still_readable() {
  let s = store().await;

  let later = Utc::now() + Duration::hours(1);
  s.put("quarantine/new", b"held".to_vec(), Some(later))
    .await
    .unwrap();

  let record = s.get("quarantine/new").await.unwrap().unwrap();
  assert_eq!(record.bytes, b"held");
}

#[tokio::test]
async fn conditional_create_succeeds_over_an_expired_row() {
  let s = store().await;

  let past = Utc::now() - Duration::seconds(5);
  s.put("story/current", b"stale".to_vec(), Some(past))
    .await
    .unwrap();

  let outcome = s
    .put_if_version("story/current", b"fresh".to_vec(), None)
    .await
    .unwrap();
  assert_eq!(outcome, Cas::Stored(1));

  // Conditionally written records never expire.
  let record = s.get("story/current").await.unwrap().unwrap();
  assert_eq!(record.bytes, b"fresh");
}

#[tokio::test]
async fn stale_expectation_against_an_expired_row_conflicts() {
  let s = store().await;

  let past = Utc::now() - Duration::seconds(5);
  s.put("story/current", b"stale".to_vec(), Some(past))
    .await
    .unwrap();

  let outcome = s
    .put_if_version("story/current", b"late".to_vec(), Some(1))
    .await
    .unwrap();
  assert_eq!(outcome, Cas::Conflict);
}

// ─── Repository integration ──────────────────────────────────────────────────

#[tokio::test]
async fn story_repository_runs_over_sqlite() {
  let s = store().await;
  let settings = Arc::new(Settings::default());
  let repo = StoryRepository::new(s.clone(), settings.clone());

  let seed = Story::new(Utc::now(), settings.round_secs);
  let outcome = repo
    .update_current(|current| match current {
      None => Transition::Write(seed.clone()),
      Some(_) => Transition::Noop,
    })
    .await
    .unwrap();
  assert_eq!(outcome.written().unwrap().story_id, seed.story_id);

  let loaded = repo.load_current().await.unwrap().unwrap();
  assert_eq!(loaded.story_id, seed.story_id);
  assert_eq!(loaded.round_number, 1);

  // The wire format is plain JSON with lowercase statuses.
  let raw = s.get("story/current").await.unwrap().unwrap();
  let value: serde_json::Value = serde_json::from_slice(&raw.bytes).unwrap();
  assert_eq!(value["status"], "active");
}
