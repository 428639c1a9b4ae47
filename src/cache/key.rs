//! Cache Key Module
//!
//! Keys are opaque byte strings compared by full equality.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use crate::cache::region::{Charge, Region};
use crate::error::Result;

// == Cache Key ==
/// An opaque byte key.
///
/// Built from an `Arc<[u8]>` the key shares the caller's buffer; built from a
/// borrowed slice or string it is copied once.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<[u8]>);

impl CacheKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copies the key bytes into cache-owned storage charged to `region`.
    pub(crate) fn duplicate(&self, region: &Arc<Region>) -> Result<OwnedKey> {
        let charge = region.charge(self.len())?;
        Ok(OwnedKey {
            key: CacheKey(Arc::from(&self.0[..])),
            _charge: charge,
        })
    }

    /// Lossy UTF-8 rendering for logs and error messages.
    pub fn display(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({:?})", self.display())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl Borrow<[u8]> for CacheKey {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for CacheKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Arc<[u8]>> for CacheKey {
    fn from(bytes: Arc<[u8]>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for CacheKey {
    fn from(bytes: &[u8]) -> Self {
        Self(Arc::from(bytes))
    }
}

impl From<Vec<u8>> for CacheKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Arc::from(bytes))
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::from(s.as_bytes())
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::from(s.into_bytes())
    }
}

// == Owned Key ==
/// A duplicated key held by an expiration task, charged to the region.
#[derive(Debug)]
pub(crate) struct OwnedKey {
    key: CacheKey,
    _charge: Charge,
}

impl OwnedKey {
    pub(crate) fn key(&self) -> &CacheKey {
        &self.key
    }
}
