//! Local Cache - churn host
//!
//! Drives a cache with concurrent insert/get/remove workers and TTL-bearing
//! entries, reporting statistics until shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use local_cache::{Cache, CacheError, CancelSignal, Config, Payload};

/// Main entry point for the churn host.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load and validate configuration from environment variables
/// 3. Build the cache
/// 4. Start churn workers and the stats reporter
/// 5. On SIGINT/SIGTERM stop the workers and tear the cache down
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "local_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting local cache churn host");

    let config = Config::from_env();
    config.validate_host().context("invalid configuration")?;
    info!(
        "Configuration loaded: alignment={}, memory_limit={:?}, workers={}, keys={}, ttl={}ms",
        config.alignment,
        config.memory_limit,
        config.churn_workers,
        config.churn_keys,
        config.churn_ttl_ms
    );

    let cache: Arc<Cache<Vec<u8>>> = Arc::new(Cache::new(&config)?);
    let stop = CancelSignal::new();

    let mut handles: Vec<JoinHandle<()>> = (0..config.churn_workers)
        .map(|id| spawn_worker(id, Arc::clone(&cache), &config, stop.clone()))
        .collect();
    handles.push(spawn_reporter(
        Arc::clone(&cache),
        Duration::from_secs(config.report_interval),
        stop.clone(),
    ));
    info!("Churn workers started");

    shutdown_signal().await;
    stop.cancel();

    for handle in handles {
        handle.await.context("worker task failed")?;
    }

    let cache = Arc::try_unwrap(cache).map_err(|_| anyhow!("cache still shared at shutdown"))?;
    let footprint = cache.deinit().await;
    info!(
        "Shutdown complete: {}",
        serde_json::to_string(&footprint).context("failed to encode footprint")?
    );

    Ok(())
}

/// Spawns one worker cycling through its own key space.
///
/// Even slots get cache-owned copies, odd slots share a caller buffer.
fn spawn_worker(
    id: usize,
    cache: Arc<Cache<Vec<u8>>>,
    config: &Config,
    stop: CancelSignal,
) -> JoinHandle<()> {
    let keys = config.churn_keys;
    let ttl = Duration::from_millis(config.churn_ttl_ms);
    let shared: Arc<Vec<u8>> = Arc::new(format!("worker-{}", id).into_bytes());

    tokio::spawn(async move {
        let mut round: usize = 0;

        while !stop.is_cancelled() {
            for slot in 0..keys {
                let key = format!("w{}:{}", id, slot);
                let payload = if slot % 2 == 0 {
                    Payload::Value(vec![(round % 256) as u8; 32])
                } else {
                    Payload::Shared(Arc::clone(&shared))
                };

                match cache.insert_cancellable(key.as_str(), payload, Some(ttl), &stop).await {
                    Ok(()) | Err(CacheError::Clobber(_)) => {}
                    Err(CacheError::Cancelled) => return,
                    Err(err) => warn!(worker = id, error = %err, "Insert failed"),
                }

                if cache.get(&key).await.is_none() {
                    debug!(worker = id, key = %key, "Entry gone before read");
                }

                if (slot + round) % 7 == 0 {
                    cache.remove(&key).await;
                }
            }

            round = round.wrapping_add(1);
            tokio::time::sleep(ttl / 2).await;
        }
    })
}

/// Logs cache statistics as JSON every `interval`.
fn spawn_reporter(
    cache: Arc<Cache<Vec<u8>>>,
    interval: Duration,
    stop: CancelSignal,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let stats = cache.stats().await;
            let report = serde_json::json!({
                "stats": stats,
                "hit_rate": stats.hit_rate(),
                "footprint": cache.footprint(),
                "pending_expirations": cache.pending_expirations(),
            });
            info!("Cache report: {}", report);
        }
    })
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
