//! The `Broadcast` trait — fire-and-forget event publication.
//!
//! Lifecycle events (sentence appended, story completed, story archived,
//! story started) are announced so interested surfaces can refresh. Delivery
//! is best-effort: the lifecycle logs a failed publish and moves on, and no
//! state transition ever depends on one.

use std::future::Future;

use thiserror::Error;

/// The single topic all story events are published on; the event name
/// travels in the payload.
pub const STORY_TOPIC: &str = "story";

#[derive(Debug, Error)]
#[error("broadcast publish failed: {0}")]
pub struct BroadcastError(pub String);

pub trait Broadcast: Send + Sync {
  fn publish<'a>(
    &'a self,
    topic: &'a str,
    payload: serde_json::Value,
  ) -> impl Future<Output = Result<(), BroadcastError>> + Send + 'a;
}

/// Discards every event. The wiring of choice when no realtime surface is
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBroadcast;

impl Broadcast for NullBroadcast {
  async fn publish(
    &self,
    _topic: &str,
    _payload: serde_json::Value,
  ) -> Result<(), BroadcastError> {
    Ok(())
  }
}
