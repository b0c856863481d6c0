//! Webhook broadcast adapter.
//!
//! Lifecycle events leave the process as a single POST per event. Delivery
//! failures surface as errors here and are swallowed (with a log line) by
//! the lifecycle manager, so a dead consumer can never stall a round.

use std::time::Duration;

use fable_core::broadcast::{Broadcast, BroadcastError};
use reqwest::Client;
use serde_json::json;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// POSTs events to a configured webhook. Without a URL every publish is a
/// silent success, which keeps the wiring uniform when no consumer exists.
#[derive(Clone)]
pub struct WebhookBroadcast {
  client: Client,
  url:    Option<String>,
}

impl WebhookBroadcast {
  pub fn new(url: Option<String>) -> reqwest::Result<Self> {
    let client = Client::builder().timeout(PUBLISH_TIMEOUT).build()?;
    Ok(Self { client, url })
  }
}

impl Broadcast for WebhookBroadcast {
  async fn publish(
    &self,
    topic: &str,
    payload: serde_json::Value,
  ) -> Result<(), BroadcastError> {
    let Some(url) = &self.url else { return Ok(()) };
    let resp = self
      .client
      .post(url)
      .json(&json!({ "topic": topic, "payload": payload }))
      .send()
      .await
      .map_err(|e| BroadcastError(e.to_string()))?;
    if !resp.status().is_success() {
      return Err(BroadcastError(format!(
        "webhook answered {}",
        resp.status()
      )));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use httpmock::prelude::*;
  use serde_json::json;

  use super::*;

  #[tokio::test]
  async fn publish_posts_topic_and_payload() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
      when.method(POST).path("/hooks/story").json_body(json!({
        "topic": "story",
        "payload": { "event": "story.started" }
      }));
      then.status(204);
    });

    let hook = WebhookBroadcast::new(Some(server.url("/hooks/story"))).unwrap();
    hook
      .publish("story", json!({ "event": "story.started" }))
      .await
      .unwrap();

    mock.assert();
  }

  #[tokio::test]
  async fn failed_deliveries_surface_as_errors() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method(POST).path("/hooks/story");
      then.status(500);
    });

    let hook = WebhookBroadcast::new(Some(server.url("/hooks/story"))).unwrap();
    let err = hook
      .publish("story", json!({ "event": "story.started" }))
      .await
      .unwrap_err();

    assert!(err.0.contains("500"), "{err}");
  }

  #[tokio::test]
  async fn missing_url_drops_events() {
    let hook = WebhookBroadcast::new(None).unwrap();
    hook.publish("story", json!({ "event": "noop" })).await.unwrap();
  }
}
