//! JSON REST API for fable.
//!
//! Exposes an axum [`Router`] over a [`LifecycleManager`], generic over the
//! manager's store, candidate-source, and broadcast collaborators so any
//! backend combination serves the same surface. Auth, TLS, and transport
//! concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! fable_api::api_router(manager.clone())
//! ```

pub mod archive;
pub mod error;
pub mod leaderboard;
pub mod story;
pub mod ticks;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use fable_core::{
  broadcast::Broadcast, lifecycle::LifecycleManager, source::CandidateSource,
  store::StateStore,
};

pub use error::ApiError;

/// Build a fully-materialised API router for `manager`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, C, B>(
  manager: Arc<LifecycleManager<S, C, B>>,
) -> Router<()>
where
  S: StateStore + 'static,
  C: CandidateSource + 'static,
  B: Broadcast + 'static,
{
  Router::new()
    // Story
    .route("/story", get(story::current::<S, C, B>))
    .route("/story/submissions", post(story::submit::<S, C, B>))
    // Derived views
    .route("/leaderboard", get(leaderboard::top::<S, C, B>))
    .route("/archive", get(archive::list::<S, C, B>))
    // Scheduler entry points
    .route("/ticks/hourly", post(ticks::hourly::<S, C, B>))
    .route("/ticks/daily", post(ticks::daily::<S, C, B>))
    .with_state(manager)
}
