//! SQLite-backed state store for the fable story coordinator.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Records are opaque byte blobs keyed by
//! string, each carrying a version counter and an optional expiry; decoding
//! and invariant checks live in `fable-core`, this crate only guarantees
//! durable, versioned reads and writes.

mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
