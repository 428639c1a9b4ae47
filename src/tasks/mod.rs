//! Background Tasks Module
//!
//! Contains the per-entry expiration tasks and their scheduler.
//!
//! # Tasks
//! - TTL Expiration: Removes one entry after its time-to-live elapses

mod expiry;

pub use expiry::{CancelSignal, Scheduler, Sleep, Timer, TokioTimer};
