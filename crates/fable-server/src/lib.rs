//! Deployable HTTP server for the fable story coordinator.
//!
//! Wires configuration, the SQLite store, the HTTP candidate-source and
//! webhook-broadcast adapters, the in-process tick scheduler, and the JSON
//! API into one binary.

pub mod broadcast;
pub mod scheduler;
pub mod source;

use std::{path::PathBuf, sync::Arc};

use axum::Router;
use fable_core::{
  broadcast::Broadcast,
  lifecycle::LifecycleManager,
  settings::Settings,
  source::CandidateSource,
  store::StateStore,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` with
/// `FABLE_`-prefixed environment overrides.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  /// Base URL of the candidate feed the round resolver reads.
  pub candidate_feed_url: String,
  /// Seconds before an in-flight candidate fetch is abandoned.
  #[serde(default = "default_fetch_timeout")]
  pub fetch_timeout_secs: u64,
  /// Webhook that lifecycle events are POSTed to; events are dropped when
  /// unset.
  #[serde(default)]
  pub webhook_url:        Option<String>,
  /// Run the in-process tick scheduler. Disable when an external scheduler
  /// drives `/ticks/hourly` and `/ticks/daily` instead.
  #[serde(default = "default_scheduler")]
  pub scheduler:          bool,
  /// Story rules; every field has a production default.
  #[serde(default)]
  pub story:              Settings,
}

fn default_fetch_timeout() -> u64 {
  10
}

fn default_scheduler() -> bool {
  true
}

// ─── Application ──────────────────────────────────────────────────────────────

/// Build the full application: the JSON API plus request tracing.
pub fn app<S, C, B>(manager: Arc<LifecycleManager<S, C, B>>) -> Router
where
  S: StateStore + 'static,
  C: CandidateSource + 'static,
  B: Broadcast + 'static,
{
  fable_api::api_router(manager).layer(TraceLayer::new_for_http())
}

// ─── Integration tests ────────────────────────────────────────────────────────
