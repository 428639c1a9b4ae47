//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Insert targeted a key that already holds a live entry
    #[error("Key already present: {0}")]
    Clobber(String),

    /// The allocation region could not satisfy a copy or key duplication
    #[error("Out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory { requested: usize, available: usize },

    /// The caller's cancellation signal fired while waiting on the cache lock
    #[error("Cancelled while waiting for the cache lock")]
    Cancelled,

    /// The timer cannot perform timed waits
    #[error("Timer does not support timed waits")]
    UnsupportedClock,

    /// The timer failed in an unexpected way
    #[error("Unexpected timer error: {0}")]
    UnexpectedTimer(String),

    /// Construction-time configuration was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
