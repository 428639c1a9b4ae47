//! Fault Injection Module
//!
//! The cache calls [`FaultHook::checkpoint`] before each fallible step of an
//! insert. [`NoFaults`] is the production hook. [`FaultPlan`] lets tests arm a
//! checkpoint with an error, optionally after a number of successful passes.

use std::collections::HashMap;
use std::fmt;

use parking_lot::Mutex;

use crate::error::{CacheError, Result};

// == Checkpoint ==
/// Named fallible steps of the insertion path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Checkpoint {
    /// Before a by-value payload is copied into cache-owned storage
    CopyValue,
    /// Before key bytes are duplicated for an expiration task
    DuplicateKey,
    /// Before waiting on the cache lock
    AcquireLock,
    /// Under the lock, before the expiration task is committed to
    ScheduleExpiry,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Checkpoint::CopyValue => "copy_value",
            Checkpoint::DuplicateKey => "duplicate_key",
            Checkpoint::AcquireLock => "acquire_lock",
            Checkpoint::ScheduleExpiry => "schedule_expiry",
        };
        f.write_str(name)
    }
}

// == Fault Hook ==
/// Consulted by the cache before each fallible step.
pub trait FaultHook: Send + Sync + fmt::Debug {
    fn checkpoint(&self, point: Checkpoint) -> Result<()>;
}

/// Hook that never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFaults;

impl FaultHook for NoFaults {
    #[inline]
    fn checkpoint(&self, _point: Checkpoint) -> Result<()> {
        Ok(())
    }
}

// == Fault Plan ==
#[derive(Debug)]
struct Armed {
    error: CacheError,
    successes_left: usize,
}

/// Deterministic test harness: fails an armed checkpoint exactly once.
#[derive(Debug, Default)]
pub struct FaultPlan {
    armed: Mutex<HashMap<Checkpoint, Armed>>,
    passes: Mutex<HashMap<Checkpoint, usize>>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next call to `point` with `error`.
    pub fn arm(&self, point: Checkpoint, error: CacheError) {
        self.arm_after(point, 0, error);
    }

    /// Lets `successes` calls to `point` through, then fails the next one.
    pub fn arm_after(&self, point: Checkpoint, successes: usize, error: CacheError) {
        self.armed.lock().insert(
            point,
            Armed {
                error,
                successes_left: successes,
            },
        );
    }

    /// Disarms every checkpoint.
    pub fn reset(&self) {
        self.armed.lock().clear();
    }

    /// Returns true while `point` still has a pending failure.
    pub fn is_armed(&self, point: Checkpoint) -> bool {
        self.armed.lock().contains_key(&point)
    }

    /// Number of times `point` has been reached, failures included.
    pub fn passes(&self, point: Checkpoint) -> usize {
        self.passes.lock().get(&point).copied().unwrap_or(0)
    }
}

impl FaultHook for FaultPlan {
    fn checkpoint(&self, point: Checkpoint) -> Result<()> {
        *self.passes.lock().entry(point).or_insert(0) += 1;

        let mut armed = self.armed.lock();
        let Some(slot) = armed.get_mut(&point) else {
            return Ok(());
        };

        if slot.successes_left > 0 {
            slot.successes_left -= 1;
            return Ok(());
        }

        // One-shot: the checkpoint is disarmed once it fires.
        armed.remove(&point).map_or(Ok(()), |a| Err(a.error))
    }
}
