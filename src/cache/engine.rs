//! Cache Engine Module
//!
//! The public cache handle. Combines the entry store behind one async mutex,
//! the allocation region, the expiration scheduler and the fault hook.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::cache::{
    CacheEntry, CacheKey, CacheStats, EntryStore, Footprint, One, Ownership, Payload, Region,
    SliceView, Stored, View,
};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::fault::{Checkpoint, FaultHook, NoFaults};
use crate::tasks::{CancelSignal, Scheduler, Timer, TokioTimer};

// == Cache ==
/// A process-local key/value cache with optional per-entry expiration.
///
/// Every structural read or write of the entry map happens under one async
/// mutex. Views returned by lookups share storage with the entry and are not
/// protected by that lock; pick interior mutability in `V` if readers mutate.
#[derive(Debug)]
pub struct Cache<V> {
    store: Arc<Mutex<EntryStore<V>>>,
    region: Arc<Region>,
    scheduler: Scheduler,
    faults: Arc<dyn FaultHook>,
    next_epoch: AtomicU64,
}

impl<V> Cache<V>
where
    V: Send + Sync + 'static,
{
    // == Constructor ==
    /// Builds a cache with the tokio timer and no fault injection.
    pub fn new(config: &Config) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: &Config) -> CacheBuilder<V> {
        CacheBuilder::new(config.clone())
    }

    // == Insert ==
    /// Stores `payload` under `key`, expiring it after `ttl` if one is given.
    ///
    /// Fails with `Clobber` if the key is live. On any failure nothing is
    /// left behind: copied values and duplicated keys are released.
    pub async fn insert(
        &self,
        key: impl Into<CacheKey>,
        payload: impl Into<Payload<V>>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.insert_inner(key.into(), payload.into(), ttl, None).await
    }

    /// Like [`insert`](Self::insert), but gives up with `Cancelled` if
    /// `cancel` fires while waiting for the lock.
    pub async fn insert_cancellable(
        &self,
        key: impl Into<CacheKey>,
        payload: impl Into<Payload<V>>,
        ttl: Option<Duration>,
        cancel: &CancelSignal,
    ) -> Result<()> {
        self.insert_inner(key.into(), payload.into(), ttl, Some(cancel))
            .await
    }

    async fn insert_inner(
        &self,
        key: CacheKey,
        payload: Payload<V>,
        ttl: Option<Duration>,
        cancel: Option<&CancelSignal>,
    ) -> Result<()> {
        // A cache built before its runtime was entered gets its clock probed here
        if ttl.is_some() {
            self.scheduler.check_timer()?;
        }

        // Ownership is settled before the lock is taken. Each partial step is
        // an owned value, so an early return drops (and releases) it.
        if payload.ownership() == Ownership::Copied {
            self.faults.checkpoint(Checkpoint::CopyValue)?;
        }
        let stored = Stored::acquire(payload, &self.region)?;

        let expiry_key = match ttl {
            Some(_) => {
                self.faults.checkpoint(Checkpoint::DuplicateKey)?;
                Some(key.duplicate(&self.region)?)
            }
            None => None,
        };

        self.faults.checkpoint(Checkpoint::AcquireLock)?;
        let mut store = self.lock(cancel).await?;

        if ttl.is_some() {
            self.faults.checkpoint(Checkpoint::ScheduleExpiry)?;
        }

        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let entry = CacheEntry::new(stored, epoch, ttl.is_some());
        if let Err(err) = store.insert(key.clone(), entry) {
            debug!(key = %key, "Insert rejected, key is live");
            return Err(err);
        }
        drop(store);

        if let (Some(ttl), Some(expiry_key)) = (ttl, expiry_key) {
            self.scheduler
                .schedule(Arc::clone(&self.store), expiry_key, epoch, ttl);
        }

        debug!(key = %key, epoch, ttl = ?ttl, "Entry inserted");
        Ok(())
    }

    async fn lock(&self, cancel: Option<&CancelSignal>) -> Result<MutexGuard<'_, EntryStore<V>>> {
        match cancel {
            None => Ok(self.store.lock().await),
            Some(signal) => {
                tokio::select! {
                    biased;
                    _ = signal.cancelled() => Err(CacheError::Cancelled),
                    guard = self.store.lock() => Ok(guard),
                }
            }
        }
    }

    // == Get ==
    /// Returns a view of the entry under `key`, if any.
    pub async fn get(&self, key: impl AsRef<[u8]>) -> Option<View<V>> {
        self.store.lock().await.view(key.as_ref())
    }

    /// Single-value view. Sequences yield their first item.
    pub async fn get_one(&self, key: impl AsRef<[u8]>) -> Option<One<V>> {
        self.get(key).await.and_then(View::into_one)
    }

    /// The first `len` items of a stored sequence. None if the entry is not a
    /// sequence or is shorter than `len`.
    pub async fn get_slice(&self, key: impl AsRef<[u8]>, len: usize) -> Option<SliceView<V>> {
        self.get(key)
            .await
            .and_then(View::into_slice)
            .and_then(|items| items.truncate(len))
    }

    pub async fn contains(&self, key: impl AsRef<[u8]>) -> bool {
        self.store.lock().await.contains(key.as_ref())
    }

    // == Remove ==
    /// Removes `key`. Returns false if it was not present.
    ///
    /// A pending expiration task is left running; it finds nothing on wake.
    pub async fn remove(&self, key: impl AsRef<[u8]>) -> bool {
        let removed = self.store.lock().await.remove(key.as_ref());
        if removed {
            debug!(key = %String::from_utf8_lossy(key.as_ref()), "Entry removed");
        }
        removed
    }

    // == Clear ==
    /// Cancels every pending expiration, then drops all entries.
    pub async fn clear(&self) -> usize {
        self.scheduler.cancel_all().await;
        let removed = self.store.lock().await.clear();
        info!(removed, "Cache cleared");
        removed
    }

    // == Deinit ==
    /// Tears the cache down and returns the final region footprint.
    pub async fn deinit(self) -> Footprint {
        let cancelled = self.scheduler.cancel_all().await;
        let removed = self.store.lock().await.clear();
        let footprint = self.region.footprint();
        info!(
            removed,
            cancelled,
            total_bytes = footprint.total_bytes,
            peak_bytes = footprint.peak_bytes,
            "Cache shut down"
        );
        footprint
    }

    // == Introspection ==
    pub async fn stats(&self) -> CacheStats {
        self.store.lock().await.stats()
    }

    pub async fn len(&self) -> usize {
        self.store.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.lock().await.is_empty()
    }

    pub fn footprint(&self) -> Footprint {
        self.region.footprint()
    }

    /// Number of expiration tasks that have not been reaped yet.
    pub fn pending_expirations(&self) -> usize {
        self.scheduler.outstanding()
    }
}

// == Cache Builder ==
/// Configures the collaborators a [`Cache`] is built with.
#[derive(Debug)]
pub struct CacheBuilder<V> {
    config: Config,
    timer: Arc<dyn Timer>,
    faults: Arc<dyn FaultHook>,
    _values: PhantomData<fn() -> V>,
}

impl<V> CacheBuilder<V>
where
    V: Send + Sync + 'static,
{
    pub fn new(config: Config) -> Self {
        Self {
            config,
            timer: Arc::new(TokioTimer),
            faults: Arc::new(NoFaults),
            _values: PhantomData,
        }
    }

    pub fn timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = timer;
        self
    }

    pub fn faults(mut self, faults: Arc<dyn FaultHook>) -> Self {
        self.faults = faults;
        self
    }

    /// Fails with `InvalidConfig` or `UnsupportedClock`.
    pub fn build(self) -> Result<Cache<V>> {
        self.config.validate()?;

        let scheduler = Scheduler::new(self.timer);
        scheduler.check_timer()?;

        Ok(Cache {
            store: Arc::new(Mutex::new(EntryStore::new())),
            region: Region::new(self.config.alignment, self.config.memory_limit),
            scheduler,
            faults: self.faults,
            next_epoch: AtomicU64::new(1),
        })
    }
}
