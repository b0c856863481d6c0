//! HTTP candidate-source adapter.
//!
//! The round resolver reads the external voting surface through this client:
//! one `GET /candidates` per resolution, scoped to a story, round, and
//! window. Error classification matters more than the happy path here, since
//! it decides whether the caller's backoff retries or gives up.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use fable_core::source::{Candidate, CandidateSource, RoundTag, SourceError};
use reqwest::Client;

/// Candidate feed client. Cheap to clone — the inner [`Client`] is
/// reference-counted.
#[derive(Clone)]
pub struct HttpCandidateSource {
  client:   Client,
  base_url: String,
  timeout:  Duration,
}

impl HttpCandidateSource {
  pub fn new(base_url: String, timeout: Duration) -> reqwest::Result<Self> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, base_url, timeout })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url.trim_end_matches('/'), path)
  }
}

impl CandidateSource for HttpCandidateSource {
  async fn fetch(
    &self,
    tag: RoundTag,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
  ) -> Result<Vec<Candidate>, SourceError> {
    let resp = self
      .client
      .get(self.url("/candidates"))
      .query(&[
        ("story_id", tag.story_id.to_string()),
        ("round", tag.round_number.to_string()),
        ("since", since.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ("until", until.to_rfc3339_opts(SecondsFormat::Secs, true)),
      ])
      .send()
      .await
      .map_err(|e| classify(e, self.timeout))?;
    if !resp.status().is_success() {
      return Err(SourceError::Unavailable(format!(
        "candidate feed answered {}",
        resp.status()
      )));
    }
    resp.json::<Vec<Candidate>>().await.map_err(|e| classify(e, self.timeout))
  }
}

/// Timeouts and connection failures are worth retrying; a body that fails
/// to decode is not, because the feed would only serve it again.
fn classify(err: reqwest::Error, timeout: Duration) -> SourceError {
  if err.is_timeout() {
    SourceError::Timeout(timeout)
  } else if err.is_decode() {
    SourceError::Malformed(err.to_string())
  } else {
    SourceError::Unavailable(err.to_string())
  }
}
