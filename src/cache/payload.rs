//! Payload Module
//!
//! Decides per entry whether the cache owns a copy of the value or only holds
//! the caller's shared handle, and defines the views handed back to readers.

use std::fmt;
use std::mem;
use std::ops::Deref;
use std::sync::Arc;

use crate::cache::region::{Charge, Region};
use crate::error::Result;

// == Ownership ==
/// Who is responsible for a payload's backing memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// The cache allocated the storage and reclaims it on removal
    Copied,
    /// The caller supplied the storage; the cache never reclaims it
    Referenced,
}

// == Payload ==
/// A value submitted for insertion. The variant fixes the ownership.
#[derive(Debug, Clone)]
pub enum Payload<V> {
    /// Moved into cache-owned, cache-line aligned storage
    Value(V),
    /// A single caller-owned value
    Shared(Arc<V>),
    /// A caller-owned contiguous sequence
    Slice(Arc<[V]>),
}

impl<V> Payload<V> {
    pub fn ownership(&self) -> Ownership {
        match self {
            Payload::Value(_) => Ownership::Copied,
            Payload::Shared(_) | Payload::Slice(_) => Ownership::Referenced,
        }
    }

    /// Size of the payload in bytes.
    pub fn byte_len(&self) -> usize {
        match self {
            Payload::Value(_) | Payload::Shared(_) => mem::size_of::<V>(),
            Payload::Slice(items) => mem::size_of_val(&**items),
        }
    }
}

impl<V> From<V> for Payload<V> {
    fn from(value: V) -> Self {
        Payload::Value(value)
    }
}

// == Cache Aligned ==
/// A cache-owned copy. Its region charge lives as long as the allocation, so
/// bytes held by readers' views stay counted after the entry is gone.
///
/// Storage satisfies every alignment up to `MAX_ALIGNMENT`; the region only
/// counts the value padded to the configured boundary.
#[repr(align(128))]
#[derive(Debug)]
pub struct CacheAligned<V> {
    value: V,
    _charge: Charge,
}

impl<V> Deref for CacheAligned<V> {
    type Target = V;

    fn deref(&self) -> &V {
        &self.value
    }
}

// == Stored ==
/// A payload after ownership has been settled.
pub(crate) enum Stored<V> {
    Copied(Arc<CacheAligned<V>>),
    Shared(Arc<V>),
    Slice(Arc<[V]>),
}

impl<V> Stored<V> {
    /// Copies `Value` payloads into the region. Referenced payloads pass through.
    pub(crate) fn acquire(payload: Payload<V>, region: &Arc<Region>) -> Result<Self> {
        match payload {
            Payload::Value(value) => {
                let charge = region.charge(mem::size_of::<V>())?;
                let value = Arc::new(CacheAligned {
                    value,
                    _charge: charge,
                });
                debug_assert_eq!(
                    Arc::as_ptr(&value) as usize % region.alignment(),
                    0,
                    "copied payload misaligned"
                );
                Ok(Stored::Copied(value))
            }
            Payload::Shared(value) => Ok(Stored::Shared(value)),
            Payload::Slice(items) => Ok(Stored::Slice(items)),
        }
    }

    pub(crate) fn ownership(&self) -> Ownership {
        match self {
            Stored::Copied(_) => Ownership::Copied,
            Stored::Shared(_) | Stored::Slice(_) => Ownership::Referenced,
        }
    }

    pub(crate) fn byte_len(&self) -> usize {
        match self {
            Stored::Copied(_) | Stored::Shared(_) => mem::size_of::<V>(),
            Stored::Slice(items) => mem::size_of_val(&**items),
        }
    }

    pub(crate) fn view(&self) -> View<V> {
        match self {
            Stored::Copied(value) => View::One(One::Copied(Arc::clone(value))),
            Stored::Shared(value) => View::One(One::Shared(Arc::clone(value))),
            Stored::Slice(items) => View::Many(SliceView {
                items: Arc::clone(items),
                len: items.len(),
            }),
        }
    }
}

impl<V> fmt::Debug for Stored<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stored")
            .field("ownership", &self.ownership())
            .field("byte_len", &self.byte_len())
            .finish()
    }
}

// == Views ==
/// A single value shared with the cache entry.
pub enum One<V> {
    Copied(Arc<CacheAligned<V>>),
    Shared(Arc<V>),
    /// First item of a non-empty sequence
    Head(Arc<[V]>),
}

impl<V> Clone for One<V> {
    fn clone(&self) -> Self {
        match self {
            One::Copied(v) => One::Copied(Arc::clone(v)),
            One::Shared(v) => One::Shared(Arc::clone(v)),
            One::Head(items) => One::Head(Arc::clone(items)),
        }
    }
}

impl<V> Deref for One<V> {
    type Target = V;

    fn deref(&self) -> &V {
        match self {
            One::Copied(v) => v,
            One::Shared(v) => v,
            One::Head(items) => &items[0],
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for One<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("One").field(&**self).finish()
    }
}

/// A prefix of a stored sequence.
pub struct SliceView<V> {
    items: Arc<[V]>,
    len: usize,
}

impl<V> SliceView<V> {
    /// Narrows the view to its first `len` items. None if `len` is out of range.
    pub fn truncate(self, len: usize) -> Option<Self> {
        (len <= self.len).then_some(Self {
            items: self.items,
            len,
        })
    }
}

impl<V> Clone for SliceView<V> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
            len: self.len,
        }
    }
}

impl<V> Deref for SliceView<V> {
    type Target = [V];

    fn deref(&self) -> &[V] {
        &self.items[..self.len]
    }
}

impl<V: fmt::Debug> fmt::Debug for SliceView<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// What a lookup returns; the reader picks the shape.
#[derive(Debug)]
pub enum View<V> {
    One(One<V>),
    Many(SliceView<V>),
}

impl<V> Clone for View<V> {
    fn clone(&self) -> Self {
        match self {
            View::One(one) => View::One(one.clone()),
            View::Many(items) => View::Many(items.clone()),
        }
    }
}

impl<V> View<V> {
    /// Single-value view. For sequences this is the first item, if any.
    pub fn into_one(self) -> Option<One<V>> {
        match self {
            View::One(one) => Some(one),
            View::Many(SliceView { items, len }) => (len > 0).then_some(One::Head(items)),
        }
    }

    /// Sequence view. Only sequence payloads have one.
    pub fn into_slice(self) -> Option<SliceView<V>> {
        match self {
            View::One(_) => None,
            View::Many(items) => Some(items),
        }
    }

    /// Number of values visible through the view.
    pub fn len(&self) -> usize {
        match self {
            View::One(_) => 1,
            View::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
