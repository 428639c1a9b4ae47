//! Cache Module
//!
//! Provides the in-memory entry store, per-entry ownership tracking and the
//! cache handle that ties them to the expiration scheduler.

mod engine;
mod entry;
mod key;
mod payload;
mod region;
mod stats;
mod store;


// Re-export public types
pub use engine::{Cache, CacheBuilder};
pub use entry::CacheEntry;
pub use key::CacheKey;
pub use payload::{CacheAligned, One, Ownership, Payload, SliceView, View};
pub use region::{Charge, Footprint, Region};
pub use stats::CacheStats;
pub use store::EntryStore;

pub(crate) use key::OwnedKey;
pub(crate) use payload::Stored;

// == Public Constants ==
/// Default alignment for copied payloads, one cache line on common hardware
pub const DEFAULT_ALIGNMENT: usize = 64;

/// Smallest accepted alignment boundary
pub const MIN_ALIGNMENT: usize = 8;

/// Largest accepted alignment boundary; matches `CacheAligned`
pub const MAX_ALIGNMENT: usize = 128;
