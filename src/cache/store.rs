//! Entry Store Module
//!
//! Key to entry mapping with clobber-rejecting insertion. Every method here is
//! synchronous and expects the caller to hold the cache lock.

use std::collections::HashMap;

use crate::cache::{CacheEntry, CacheKey, CacheStats, View};
use crate::error::{CacheError, Result};

// == Entry Store ==
#[derive(Debug)]
pub struct EntryStore<V> {
    /// Key-entry storage
    entries: HashMap<CacheKey, CacheEntry<V>>,
    /// Activity counters
    stats: CacheStats,
}

impl<V> EntryStore<V> {
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            stats: CacheStats::new(),
        }
    }

    // == Insert ==
    /// Stores `entry` under `key`.
    ///
    /// Fails with `Clobber` if the key is live. The existing entry is kept and
    /// the rejected one is dropped, releasing anything it had copied.
    pub fn insert(&mut self, key: CacheKey, entry: CacheEntry<V>) -> Result<()> {
        if self.entries.contains_key(&key) {
            self.stats.record_clobber();
            return Err(CacheError::Clobber(key.display()));
        }

        self.entries.insert(key, entry);
        self.stats.record_insert();
        self.stats.set_total_entries(self.entries.len());
        Ok(())
    }

    // == Lookup ==
    /// Returns the entry for `key` without copying its payload.
    pub fn lookup(&mut self, key: &[u8]) -> Option<&CacheEntry<V>> {
        match self.entries.get(key) {
            Some(entry) => {
                self.stats.record_hit();
                Some(entry)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Lookup that hands back a shared view.
    pub fn view(&mut self, key: &[u8]) -> Option<View<V>> {
        self.lookup(key).map(CacheEntry::view)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    // == Remove ==
    /// Removes `key`. Returns false when nothing was there.
    pub fn remove(&mut self, key: &[u8]) -> bool {
        if self.entries.remove(key).is_some() {
            self.stats.record_removal();
            self.stats.set_total_entries(self.entries.len());
            true
        } else {
            false
        }
    }

    // == Expire ==
    /// Removes `key` only if it still holds the entry inserted at `epoch`.
    pub fn expire(&mut self, key: &[u8], epoch: u64) -> bool {
        let current = self.entries.get(key).map(|entry| entry.epoch);
        if current != Some(epoch) {
            return false;
        }

        self.entries.remove(key);
        self.stats.record_expiration();
        self.stats.set_total_entries(self.entries.len());
        true
    }

    // == Clear ==
    /// Drops every entry. Copied payloads return their bytes to the region;
    /// referenced payloads only lose the cache's handle.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.stats.record_cleared(count);
        self.stats.set_total_entries(0);
        count
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for EntryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}
