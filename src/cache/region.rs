//! Allocation Region Module
//!
//! Byte accounting for cache-owned memory. Every copied payload and every
//! duplicated key holds a [`Charge`] against the region; dropping the charge
//! returns its bytes. `total_bytes` only ever grows, so it shows how much the
//! cache has allocated over its lifetime under churn.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::error::{CacheError, Result};

// == Footprint ==
/// Snapshot of the region's byte counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Footprint {
    /// Bytes currently held by copied payloads and duplicated keys
    pub live_bytes: usize,
    /// Highest value `live_bytes` has reached
    pub peak_bytes: usize,
    /// Bytes charged over the region's lifetime
    pub total_bytes: u64,
}

// == Region ==
#[derive(Debug)]
pub struct Region {
    alignment: usize,
    limit: Option<usize>,
    live: AtomicUsize,
    peak: AtomicUsize,
    total: AtomicU64,
}

impl Region {
    /// `alignment` must be a power of two.
    pub fn new(alignment: usize, limit: Option<usize>) -> Arc<Self> {
        debug_assert!(alignment.is_power_of_two());
        Arc::new(Self {
            alignment,
            limit,
            live: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            total: AtomicU64::new(0),
        })
    }

    /// Size of a charge for `bytes`, padded to the alignment boundary.
    ///
    /// Zero-sized requests still occupy one aligned slot.
    pub fn padded(&self, bytes: usize) -> usize {
        let bytes = bytes.max(1);
        (bytes + self.alignment - 1) & !(self.alignment - 1)
    }

    /// Reserves `bytes` (padded) against the region.
    pub fn charge(self: &Arc<Self>, bytes: usize) -> Result<Charge> {
        let padded = self.padded(bytes);

        let reserved = self
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                let next = live.checked_add(padded)?;
                match self.limit {
                    Some(limit) if next > limit => None,
                    _ => Some(next),
                }
            });

        match reserved {
            Ok(previous) => {
                self.peak.fetch_max(previous + padded, Ordering::AcqRel);
                self.total.fetch_add(padded as u64, Ordering::Relaxed);
                Ok(Charge {
                    region: Arc::clone(self),
                    bytes: padded,
                })
            }
            Err(live) => Err(CacheError::OutOfMemory {
                requested: padded,
                available: self.limit.unwrap_or(usize::MAX).saturating_sub(live),
            }),
        }
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn footprint(&self) -> Footprint {
        Footprint {
            live_bytes: self.live.load(Ordering::Acquire),
            peak_bytes: self.peak.load(Ordering::Acquire),
            total_bytes: self.total.load(Ordering::Relaxed),
        }
    }

    fn release(&self, bytes: usize) {
        self.live.fetch_sub(bytes, Ordering::AcqRel);
    }
}

// == Charge ==
/// Bytes held against a [`Region`]; returned on drop.
#[derive(Debug)]
pub struct Charge {
    region: Arc<Region>,
    bytes: usize,
}

impl Charge {
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for Charge {
    fn drop(&mut self) {
        self.region.release(self.bytes);
    }
}
