//! TTL Expiration Tasks
//!
//! One background task per TTL-bearing entry. Each task sleeps on the
//! configured [`Timer`], then removes its entry under the cache lock unless it
//! was cancelled first. [`Scheduler::cancel_all`] signals every outstanding
//! task and waits for all of them to exit.

use std::fmt;
use std::future::Future;
use std::panic;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::runtime::Handle;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::cache::{EntryStore, OwnedKey};
use crate::error::{CacheError, Result};

// == Timer ==
/// Future returned by [`Timer::sleep`].
pub type Sleep = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Sleeping primitive used by expiration tasks.
pub trait Timer: Send + Sync + fmt::Debug + 'static {
    /// Returns false if this timer cannot perform timed waits at all.
    fn supports_timed_wait(&self) -> bool;

    /// Waits for `duration`. Errors are `UnsupportedClock` or `UnexpectedTimer`.
    fn sleep(&self, duration: Duration) -> Sleep;
}

/// Timer backed by the tokio runtime.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioTimer;

impl TokioTimer {
    /// tokio panics when a sleep is created on a runtime without a time driver.
    fn try_sleep(duration: Duration) -> Result<tokio::time::Sleep> {
        panic::catch_unwind(|| tokio::time::sleep(duration))
            .map_err(|_| CacheError::UnsupportedClock)
    }
}

impl Timer for TokioTimer {
    /// Probes the current runtime's time driver. Outside a runtime there is
    /// nothing to probe yet, so the answer is deferred to the first TTL insert.
    fn supports_timed_wait(&self) -> bool {
        match Handle::try_current() {
            Ok(_) => Self::try_sleep(Duration::ZERO).is_ok(),
            Err(_) => true,
        }
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(async move {
            Self::try_sleep(duration)?.await;
            Ok(())
        })
    }
}

// == Cancel Signal ==
/// A one-way cancellation flag that any number of tasks can wait on.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

// == Scheduler ==
/// Tasks sharing one cancellation signal.
struct Generation {
    signal: CancelSignal,
    tasks: JoinSet<()>,
}

impl Generation {
    fn new() -> Self {
        Self {
            signal: CancelSignal::new(),
            tasks: JoinSet::new(),
        }
    }
}

/// Owns every outstanding expiration task. Dropping it aborts them all.
pub struct Scheduler {
    timer: Arc<dyn Timer>,
    current: SyncMutex<Generation>,
}

impl Scheduler {
    pub fn new(timer: Arc<dyn Timer>) -> Self {
        Self {
            timer,
            current: SyncMutex::new(Generation::new()),
        }
    }

    /// Fails with `UnsupportedClock` if the timer cannot do timed waits.
    pub fn check_timer(&self) -> Result<()> {
        if self.timer.supports_timed_wait() {
            Ok(())
        } else {
            Err(CacheError::UnsupportedClock)
        }
    }

    // == Schedule ==
    /// Spawns the expiration task for the entry stored under `key` at `epoch`.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn schedule<V>(
        &self,
        store: Arc<Mutex<EntryStore<V>>>,
        key: OwnedKey,
        epoch: u64,
        ttl: Duration,
    ) where
        V: Send + Sync + 'static,
    {
        let sleep = self.timer.sleep(ttl);
        let mut current = self.current.lock();

        // Reap tasks that already finished so the set does not grow under churn
        while current.tasks.try_join_next().is_some() {}

        let signal = current.signal.clone();
        current
            .tasks
            .spawn(run_expiry(store, key, epoch, ttl, sleep, signal));
    }

    /// Number of tasks not yet reaped.
    pub fn outstanding(&self) -> usize {
        self.current.lock().tasks.len()
    }

    // == Cancel All ==
    /// Signals every outstanding task and waits until each one has exited.
    ///
    /// Tasks scheduled while this runs belong to a fresh generation and are
    /// not affected. Returns the number of tasks joined.
    pub async fn cancel_all(&self) -> usize {
        let mut retired = std::mem::replace(&mut *self.current.lock(), Generation::new());
        retired.signal.cancel();

        let mut joined = 0;
        while let Some(result) = retired.tasks.join_next().await {
            joined += 1;
            if let Err(err) = result {
                if err.is_panic() {
                    warn!(error = %err, "Expiration task panicked");
                }
            }
        }

        if joined > 0 {
            info!(tasks = joined, "Cancelled pending expirations");
        }
        joined
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("timer", &self.timer)
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

async fn run_expiry<V>(
    store: Arc<Mutex<EntryStore<V>>>,
    key: OwnedKey,
    epoch: u64,
    ttl: Duration,
    sleep: Sleep,
    signal: CancelSignal,
) {
    let outcome = tokio::select! {
        biased;
        _ = signal.cancelled() => None,
        result = sleep => Some(result),
    };

    match outcome {
        None => {
            debug!(key = %key.key(), "Expiration cancelled");
            return;
        }
        Some(Ok(())) => {}
        Some(Err(CacheError::UnsupportedClock)) => {
            error!(
                key = %key.key(),
                "Timer cannot perform timed waits, entry will not expire"
            );
            return;
        }
        Some(Err(err)) => {
            warn!(key = %key.key(), error = %err, "Timer failed, expiring entry early");
        }
    }

    let removed = store.lock().await.expire(key.key().as_bytes(), epoch);
    if removed {
        debug!(key = %key.key(), ttl_ms = ttl.as_millis() as u64, "Entry expired");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, CacheKey, Payload, Region, Stored};

    fn store_with(
        region: &Arc<Region>,
        key: &str,
        epoch: u64,
    ) -> Arc<Mutex<EntryStore<u32>>> {
        let mut store = EntryStore::new();
        let stored = Stored::acquire(Payload::Value(1u32), region).unwrap();
        store
            .insert(key.into(), CacheEntry::new(stored, epoch, true))
            .unwrap();
        Arc::new(Mutex::new(store))
    }

    #[derive(Debug)]
    struct BrokenTimer(CacheError);

    impl Timer for BrokenTimer {
        fn supports_timed_wait(&self) -> bool {
            !matches!(self.0, CacheError::UnsupportedClock)
        }

        fn sleep(&self, _duration: Duration) -> Sleep {
            let err = self.0.clone();
            Box::pin(async move { Err(err) })
        }
    }

    #[tokio::test]
    async fn test_cancel_signal() {
        let signal = CancelSignal::new();
        assert!(!signal.is_cancelled());

        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };

        signal.cancel();
        waiter.await.unwrap();
        assert!(signal.is_cancelled());

        // Waiting after the fact resolves immediately
        signal.cancelled().await;
    }

    #[tokio::test]
    async fn test_expiry_removes_entry() {
        let region = Region::new(64, None);
        let store = store_with(&region, "expire_soon", 1);
        let scheduler = Scheduler::new(Arc::new(TokioTimer));
        let key = CacheKey::from("expire_soon").duplicate(&region).unwrap();

        scheduler.schedule(store.clone(), key, 1, Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!store.lock().await.contains(b"expire_soon"));
        // Payload and duplicated key are both released
        assert_eq!(region.footprint().live_bytes, 0);
    }

    #[tokio::test]
    async fn test_cancel_all_skips_removal() {
        let region = Region::new(64, None);
        let store = store_with(&region, "long_lived", 1);
        let scheduler = Scheduler::new(Arc::new(TokioTimer));
        let key = CacheKey::from("long_lived").duplicate(&region).unwrap();

        scheduler.schedule(store.clone(), key, 1, Duration::from_secs(3600));
        assert_eq!(scheduler.outstanding(), 1);

        assert_eq!(scheduler.cancel_all().await, 1);
        assert_eq!(scheduler.outstanding(), 0);
        assert!(store.lock().await.contains(b"long_lived"));
    }

    #[tokio::test]
    async fn test_unexpected_timer_error_still_expires() {
        let region = Region::new(64, None);
        let store = store_with(&region, "flaky", 3);
        let timer = BrokenTimer(CacheError::UnexpectedTimer("clock jumped".to_string()));
        let scheduler = Scheduler::new(Arc::new(timer));
        let key = CacheKey::from("flaky").duplicate(&region).unwrap();

        scheduler.schedule(store.clone(), key, 3, Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!store.lock().await.contains(b"flaky"));
    }

    #[tokio::test]
    async fn test_unsupported_timer_rejected() {
        let scheduler = Scheduler::new(Arc::new(BrokenTimer(CacheError::UnsupportedClock)));
        assert_eq!(scheduler.check_timer(), Err(CacheError::UnsupportedClock));

        let scheduler = Scheduler::new(Arc::new(TokioTimer));
        assert!(scheduler.check_timer().is_ok());
    }

    #[test]
    fn test_tokio_timer_outside_runtime() {
        // Nothing to probe before a runtime is entered
        assert!(TokioTimer.supports_timed_wait());
    }

    #[test]
    fn test_tokio_timer_without_time_driver() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        rt.block_on(async {
            assert!(!TokioTimer.supports_timed_wait());
            let scheduler = Scheduler::new(Arc::new(TokioTimer));
            assert_eq!(scheduler.check_timer(), Err(CacheError::UnsupportedClock));
            assert_eq!(
                TokioTimer.sleep(Duration::from_millis(1)).await,
                Err(CacheError::UnsupportedClock)
            );
        });
    }

    #[tokio::test]
    async fn test_unsupported_clock_in_task_keeps_entry() {
        #[derive(Debug)]
        struct LateFailure;

        impl Timer for LateFailure {
            fn supports_timed_wait(&self) -> bool {
                true
            }

            fn sleep(&self, _duration: Duration) -> Sleep {
                Box::pin(async { Err(CacheError::UnsupportedClock) })
            }
        }

        let region = Region::new(64, None);
        let store = store_with(&region, "stuck", 1);
        let scheduler = Scheduler::new(Arc::new(LateFailure));
        let key = CacheKey::from("stuck").duplicate(&region).unwrap();

        scheduler.schedule(store.clone(), key, 1, Duration::from_millis(1));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut guard = store.lock().await;
        assert!(guard.contains(b"stuck"));
        assert_eq!(guard.stats().expirations, 0);
        drop(guard);

        // The task has exited and released its duplicated key
        assert_eq!(scheduler.cancel_all().await, 1);
        assert_eq!(region.footprint().live_bytes, 64);
    }

    #[tokio::test]
    async fn test_stale_task_leaves_reinserted_entry() {
        let region = Region::new(64, None);
        let store = store_with(&region, "reused", 1);
        let scheduler = Scheduler::new(Arc::new(TokioTimer));
        let key = CacheKey::from("reused").duplicate(&region).unwrap();

        scheduler.schedule(store.clone(), key, 1, Duration::from_millis(5));

        {
            let mut guard = store.lock().await;
            assert!(guard.remove(b"reused"));
            let stored = Stored::acquire(Payload::Value(2u32), &region).unwrap();
            guard
                .insert("reused".into(), CacheEntry::new(stored, 2, false))
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.lock().await.contains(b"reused"));
    }
}
