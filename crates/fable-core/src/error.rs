//! Error types for `fable-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The candidate source failed. Carries the adapter's own taxonomy.
  #[error("candidate source error: {0}")]
  Source(#[from] crate::source::SourceError),

  /// The backing store failed at the transport or engine level.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// A compare-and-swap loop ran out of attempts without landing a write.
  #[error("gave up writing {key} after {attempts} contended attempts")]
  Contention { key: String, attempts: u32 },

  /// A persisted record failed decoding or violated a story invariant.
  /// Never repaired in place; see `StoryRepository::quarantine_current`.
  #[error("corrupt record at {key}: {reason}")]
  Corrupt { key: String, reason: String },

  /// A caller asked the repository to write a state change the story
  /// machine does not allow.
  #[error("illegal story transition: {reason}")]
  Transition { reason: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Whether the shared backoff policy should retry this error within the
  /// same tick. Contention and corruption are terminal for a tick; the next
  /// scheduled tick picks up from whatever state actually persisted.
  pub fn is_transient(&self) -> bool {
    match self {
      Error::Source(source) => source.is_transient(),
      Error::Store(_) => true,
      Error::Contention { .. }
      | Error::Corrupt { .. }
      | Error::Transition { .. }
      | Error::Serialization(_) => false,
    }
  }

  pub(crate) fn store<E>(err: E) -> Self
  where E: std::error::Error + Send + Sync + 'static {
    Error::Store(Box::new(err))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
