//! Cache Entry Module
//!
//! Defines the structure for individual cache entries.

use chrono::{DateTime, Utc};

use crate::cache::payload::{Ownership, Stored, View};

// == Cache Entry ==
/// Represents a single stored item with its ownership metadata.
#[derive(Debug)]
pub struct CacheEntry<V> {
    /// The stored payload
    pub(crate) payload: Stored<V>,
    /// Insertion sequence number, unique over the cache lifetime
    pub epoch: u64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// True when an expiration task was scheduled for this entry
    pub expires: bool,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    pub(crate) fn new(payload: Stored<V>, epoch: u64, expires: bool) -> Self {
        Self {
            payload,
            epoch,
            created_at: Utc::now(),
            expires,
        }
    }

    /// Who owns the payload's memory.
    pub fn ownership(&self) -> Ownership {
        self.payload.ownership()
    }

    /// Payload size in bytes.
    pub fn byte_len(&self) -> usize {
        self.payload.byte_len()
    }

    /// A view sharing the entry's storage. No payload bytes are copied.
    pub fn view(&self) -> View<V> {
        self.payload.view()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::payload::Payload;
    use crate::cache::region::Region;
    use std::sync::Arc;

    #[test]
    fn test_entry_copied() {
        let region = Region::new(64, None);
        let stored = Stored::acquire(Payload::Value(42u32), &region).unwrap();
        let entry = CacheEntry::new(stored, 1, false);

        assert_eq!(entry.ownership(), Ownership::Copied);
        assert_eq!(entry.byte_len(), 4);
        assert_eq!(entry.epoch, 1);
        assert!(!entry.expires);
        assert!(entry.created_at <= Utc::now());
    }

    #[test]
    fn test_entry_view_shares_storage() {
        let region = Region::new(64, None);
        let shared = Arc::new(10u64);
        let stored = Stored::acquire(Payload::Shared(Arc::clone(&shared)), &region).unwrap();
        let entry = CacheEntry::new(stored, 7, true);

        let view = entry.view().into_one().unwrap();
        assert!(std::ptr::eq(&*view, &*shared));
        assert_eq!(entry.ownership(), Ownership::Referenced);
    }
}
