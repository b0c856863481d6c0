//! Handler for the `/archive` endpoint.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use fable_core::{
  broadcast::Broadcast,
  lifecycle::LifecycleManager,
  repository::{ArchiveSort, DEFAULT_PAGE_SIZE},
  source::CandidateSource,
  story::Story,
  store::StateStore,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// 1-based page number; defaults to the first page.
  pub page:      Option<usize>,
  pub page_size: Option<usize>,
  /// `date` (newest completion first, the default) or `votes`.
  pub sort:      Option<ArchiveSort>,
}

#[derive(Debug, Serialize)]
pub struct ArchivePage {
  pub stories:     Vec<Story>,
  pub total_pages: usize,
}

/// `GET /archive[?page=][&page_size=][&sort=date|votes]`
pub async fn list<S, C, B>(
  State(manager): State<Arc<LifecycleManager<S, C, B>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<ArchivePage>, ApiError>
where
  S: StateStore + 'static,
  C: CandidateSource + 'static,
  B: Broadcast + 'static,
{
  let (stories, total_pages) = manager
    .list_archive(
      params.page.unwrap_or(1),
      params.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
      params.sort.unwrap_or_default(),
    )
    .await?;
  Ok(Json(ArchivePage { stories, total_pages }))
}
