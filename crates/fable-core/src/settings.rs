//! Tunable story rules.
//!
//! Every knob has a production default, so an empty config section yields
//! the canonical hourly, hundred-sentence story.

use serde::Deserialize;

use crate::retry::RetrySettings;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// Sentences at which a story completes.
  pub story_length:       usize,
  /// Inclusive bounds on a candidate's trimmed length, in characters.
  pub min_sentence_chars: usize,
  pub max_sentence_chars: usize,
  /// Appended when a round ends with no valid candidate.
  pub fallback_text:      String,
  /// Reserved identity credited for fallback sentences. Real submitters
  /// can never collide with it because the external surface owns the
  /// namespace and reserves this name.
  pub system_submitter:   String,
  /// Round window length in seconds.
  pub round_secs:         u64,
  /// Attempt bound for every compare-and-swap loop.
  pub cas_attempts:       u32,
  /// Entries kept on the persisted leaderboard.
  pub leaderboard_size:   usize,
  pub retry:              RetrySettings,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      story_length:       100,
      min_sentence_chars: 10,
      max_sentence_chars: 150,
      fallback_text:      "The silence grew...".to_owned(),
      system_submitter:   "system".to_owned(),
      round_secs:         3600,
      cas_attempts:       5,
      leaderboard_size:   10,
      retry:              RetrySettings::default(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_describe_the_hourly_story() {
    let settings = Settings::default();
    assert_eq!(settings.story_length, 100);
    assert_eq!(settings.round_secs, 3600);
    assert_eq!(settings.min_sentence_chars, 10);
    assert_eq!(settings.max_sentence_chars, 150);
    assert_eq!(settings.leaderboard_size, 10);
  }

  #[test]
  fn partial_overrides_keep_remaining_defaults() {
    let settings: Settings =
      serde_json::from_str(r#"{ "story_length": 5, "round_secs": 60 }"#)
        .unwrap();
    assert_eq!(settings.story_length, 5);
    assert_eq!(settings.round_secs, 60);
    assert_eq!(settings.fallback_text, "The silence grew...");
  }
}
