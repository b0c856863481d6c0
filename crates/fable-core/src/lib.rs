//! Core types and trait definitions for the fable story coordinator.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod broadcast;
pub mod error;
pub mod leaderboard;
pub mod lifecycle;
pub mod mock;
pub mod repository;
pub mod resolver;
pub mod retry;
pub mod settings;
pub mod source;
pub mod store;
pub mod story;

pub use error::{Error, Result};
pub use settings::Settings;
