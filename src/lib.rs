//! Local Cache - A process-local key/value cache
//!
//! Holds computed results in memory with optional per-entry TTL expiration,
//! clobber-rejecting inserts and explicit ownership of stored payloads.

pub mod cache;
pub mod config;
pub mod error;
pub mod fault;
pub mod tasks;

pub use cache::{Cache, CacheBuilder, CacheKey, CacheStats, Footprint, Payload, View};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::CancelSignal;
