// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod feed;
pub mod fetch;
pub mod files;
pub mod metrics;
pub mod model;
pub mod queue;
pub mod registry;
pub mod store;
pub mod sync;
pub mod translate;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::sync::FeedSyncer;
