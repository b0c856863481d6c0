//! Handlers for the `/story` endpoints.
//!
//! | Method | Path                 | Notes                                          |
//! |--------|----------------------|------------------------------------------------|
//! | `GET`  | `/story`             | Current story + seconds left in the open round |
//! | `POST` | `/story/submissions` | Advisory screening; always 200 with an outcome |

use std::sync::Arc;

use axum::{Json, extract::State};
use chrono::Utc;
use fable_core::{
  broadcast::Broadcast,
  lifecycle::{LifecycleManager, SubmissionOutcome},
  source::CandidateSource,
  story::Story,
  store::StateStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

// ─── Current Story ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CurrentStoryResponse {
  pub story:                   Story,
  /// Seconds until the open round's voting window closes.
  pub round_seconds_remaining: i64,
}

/// `GET /story`
///
/// 404 until the first tick seats a story.
pub async fn current<S, C, B>(
  State(manager): State<Arc<LifecycleManager<S, C, B>>>,
) -> Result<Json<CurrentStoryResponse>, ApiError>
where
  S: StateStore + 'static,
  C: CandidateSource + 'static,
  B: Broadcast + 'static,
{
  let (story, round_seconds_remaining) = manager
    .current_story(Utc::now())
    .await?
    .ok_or_else(|| ApiError::NotFound("no story is running yet".into()))?;
  Ok(Json(CurrentStoryResponse { story, round_seconds_remaining }))
}

// ─── Submissions ─────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /story/submissions`.
#[derive(Debug, Deserialize)]
pub struct SubmitBody {
  pub story_id:     Uuid,
  pub round_number: u32,
  pub text:         String,
}

/// `POST /story/submissions`
///
/// The sentence itself lives in the external voting surface; this endpoint
/// only tells the submitter whether their candidate can still win the named
/// round. Both verdicts answer 200, with the outcome in the body.
pub async fn submit<S, C, B>(
  State(manager): State<Arc<LifecycleManager<S, C, B>>>,
  Json(body): Json<SubmitBody>,
) -> Result<Json<SubmissionOutcome>, ApiError>
where
  S: StateStore + 'static,
  C: CandidateSource + 'static,
  B: Broadcast + 'static,
{
  let outcome = manager
    .submit_notice(body.story_id, body.round_number, &body.text)
    .await?;
  Ok(Json(outcome))
}
