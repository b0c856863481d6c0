//! The shared retry policy for transient-external failures.
//!
//! Every retried call site in the crate draws its schedule from here, so
//! changing the backoff shape is a one-place edit. Only errors reporting
//! [`crate::Error::is_transient`] are ever retried.

use std::time::Duration;

use backon::ExponentialBuilder;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
  /// Retries after the initial attempt.
  pub max_retries:  usize,
  pub min_delay_ms: u64,
  pub max_delay_ms: u64,
}

impl Default for RetrySettings {
  fn default() -> Self {
    Self { max_retries: 3, min_delay_ms: 100, max_delay_ms: 2_000 }
  }
}

impl RetrySettings {
  /// Exponential schedule with jitter, bounded in both delay and count.
  pub fn backoff(&self) -> ExponentialBuilder {
    ExponentialBuilder::default()
      .with_min_delay(Duration::from_millis(self.min_delay_ms))
      .with_max_delay(Duration::from_millis(self.max_delay_ms))
      .with_max_times(self.max_retries)
      .with_jitter()
  }
}
