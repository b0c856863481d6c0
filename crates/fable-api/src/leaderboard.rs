//! Handler for the `/leaderboard` endpoint.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use fable_core::{
  broadcast::Broadcast, leaderboard::LeaderboardEntry,
  lifecycle::LifecycleManager, source::CandidateSource, store::StateStore,
};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct TopParams {
  /// How many entries to return; defaults to the configured board size.
  pub top: Option<usize>,
}

/// `GET /leaderboard[?top=<n>]`
///
/// Entries come from the cached ranking, so a just-archived story may take
/// one cache period to appear.
pub async fn top<S, C, B>(
  State(manager): State<Arc<LifecycleManager<S, C, B>>>,
  Query(params): Query<TopParams>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError>
where
  S: StateStore + 'static,
  C: CandidateSource + 'static,
  B: Broadcast + 'static,
{
  let n = params.top.unwrap_or(manager.settings().leaderboard_size);
  Ok(Json(manager.leaderboard(n).await?))
}
