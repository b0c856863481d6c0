//! Scheduler entry points exposed over HTTP.
//!
//! Both ticks are idempotent, so an external scheduler may call them at any
//! frequency. A failed tick answers an opaque 500 and is simply retried on
//! the next natural tick.

use std::sync::Arc;

use axum::{Json, extract::State};
use fable_core::{
  broadcast::Broadcast, lifecycle::LifecycleManager, source::CandidateSource,
  store::StateStore,
};
use serde_json::{Value, json};

use crate::error::ApiError;

/// `POST /ticks/hourly` — resolve the most recently elapsed round window.
pub async fn hourly<S, C, B>(
  State(manager): State<Arc<LifecycleManager<S, C, B>>>,
) -> Result<Json<Value>, ApiError>
where
  S: StateStore + 'static,
  C: CandidateSource + 'static,
  B: Broadcast + 'static,
{
  manager.on_hourly_tick().await?;
  Ok(Json(json!({ "status": "ok" })))
}

/// `POST /ticks/daily` — archival sweep plus a full leaderboard rebuild.
pub async fn daily<S, C, B>(
  State(manager): State<Arc<LifecycleManager<S, C, B>>>,
) -> Result<Json<Value>, ApiError>
where
  S: StateStore + 'static,
  C: CandidateSource + 'static,
  B: Broadcast + 'static,
{
  manager.on_daily_tick().await?;
  Ok(Json(json!({ "status": "ok" })))
}
