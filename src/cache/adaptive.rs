//! Thread-safe cache handle and its background tasks.
//!
//! [`AdaptiveCache`] wraps a [`CacheCore`] in a tokio `RwLock`. Every mutating
//! operation takes the write lock; stats take the read lock. Nothing is
//! awaited while a lock is held: the value factory in
//! [`AdaptiveCache::get_or_compute`] runs unlocked, and a failed or cancelled
//! factory leaves the cache untouched.
//!
//! [`AdaptiveCache::start`] spawns two owned tasks:
//! 1. maintenance: sweeps expired entries and prunes stale patterns
//! 2. prefetch tick: drains due prefetch requests onto the due-key stream
//!
//! The tick only drains while a consumer holds the stream from
//! [`AdaptiveCache::prefetch_stream`]. Without one, due keys stay in the
//! scheduler for [`AdaptiveCache::poll_due`] and [`AdaptiveCache::refresh_due`].
//!
//! Both are aborted by [`AdaptiveCache::destroy`] or when the handle drops.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::cache::pattern::Pattern;
use crate::cache::stats::StatsSnapshot;
use crate::cache::store::{CacheCore, MaintenanceReport, SetOptions};
use crate::cache::value::CacheValue;
use crate::config::{Config, ConfigError};
use crate::metrics::{MetricsSink, NoopSink};

/// Thread-safe wrapper around the core.
pub type SharedCore<V> = Arc<RwLock<CacheCore<V>>>;

/// Produces fresh values for keys marked due by the prefetch scheduler.
#[async_trait]
pub trait Refresher<V>: Send + Sync {
    type Error: std::fmt::Display + Send;

    async fn refresh(&self, key: &str) -> Result<V, Self::Error>;
}

/// The adaptive cache.
pub struct AdaptiveCache<V: CacheValue> {
    core: SharedCore<V>,

    config: Arc<Config>,

    /// Background tasks owned by this handle.
    tasks: Mutex<Vec<JoinHandle<()>>>,

    due_tx: mpsc::UnboundedSender<String>,

    /// Taken once by [`AdaptiveCache::prefetch_stream`].
    due_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,

    /// Set once the due-key stream has been handed out.
    streaming: Arc<AtomicBool>,
}

impl<V: CacheValue> AdaptiveCache<V> {
    /// Create a cache with a no-op metrics sink. Background tasks are not started.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        Self::with_sink(config, Arc::new(NoopSink))
    }

    /// Create a cache reporting metric events to `sink`.
    pub fn with_sink(config: Config, sink: Arc<dyn MetricsSink>) -> Result<Self, ConfigError> {
        config.validate()?;
        let config = Arc::new(config);
        let (due_tx, due_rx) = mpsc::unbounded_channel();

        Ok(Self {
            core: Arc::new(RwLock::new(CacheCore::with_sink(config.clone(), sink))),
            config,
            tasks: Mutex::new(Vec::new()),
            due_tx,
            due_rx: Mutex::new(Some(due_rx)),
            streaming: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Spawn the maintenance and prefetch tasks on the current tokio runtime.
    ///
    /// Calling `start` again while tasks are running is a no-op.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if !tasks.is_empty() {
            return;
        }

        tasks.push(spawn_maintenance(self.core.clone(), self.config.cleanup_interval()));
        if self.config.enable_predictive {
            tasks.push(spawn_prefetch_tick(
                self.core.clone(),
                self.config.prefetch_tick(),
                self.due_tx.clone(),
                self.streaming.clone(),
            ));
        }

        info!(
            cleanup_interval_ms = self.config.maintenance.cleanup_interval_ms,
            prefetch_tick_ms = self.config.prefetch.tick_interval_ms,
            "Background tasks started"
        );
    }

    /// Look up a value.
    pub async fn get(&self, key: &str) -> Option<V> {
        self.core.write().await.get(key, Instant::now())
    }

    /// Store a value with an adaptive TTL.
    pub async fn set(&self, key: &str, value: V) {
        self.set_with(key, value, SetOptions::default()).await;
    }

    /// Store a value with an explicit TTL override and/or compute cost.
    pub async fn set_with(&self, key: &str, value: V, options: SetOptions) {
        self.core.write().await.set(key, value, options, Instant::now());
    }

    /// Return the cached value, or produce it with `factory` and store it.
    ///
    /// The factory's wall time becomes the entry's compute cost. Factory
    /// errors are returned unchanged and nothing is stored. Concurrent misses
    /// on the same key may each run the factory.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        factory: F,
        ttl: Option<Duration>,
    ) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key).await {
            return Ok(value);
        }

        let started = Instant::now();
        let value = factory().await?;
        let compute_cost = started.elapsed();

        debug!(key, compute_cost_ms = compute_cost.as_millis() as u64, "Computed value on miss");

        self.set_with(
            key,
            value.clone(),
            SetOptions {
                ttl,
                compute_cost: Some(compute_cost),
            },
        )
        .await;
        Ok(value)
    }

    /// Remove an entry and its access pattern.
    pub async fn invalidate(&self, key: &str) -> bool {
        self.core.write().await.invalidate(key)
    }

    /// Remove every entry whose key the predicate accepts.
    pub async fn invalidate_matching<P>(&self, predicate: P) -> usize
    where
        P: Fn(&str) -> bool,
    {
        self.core.write().await.invalidate_matching(predicate)
    }

    pub async fn get_stats(&self) -> StatsSnapshot {
        self.core.read().await.stats()
    }

    pub async fn get_size(&self) -> usize {
        self.core.read().await.len()
    }

    pub async fn detect_pattern(&self, key: &str) -> Pattern {
        self.core.read().await.detect_pattern(key)
    }

    /// Run one maintenance cycle now.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        self.core.write().await.run_maintenance(Instant::now())
    }

    /// Drain keys due for prefetch without waiting for the background tick.
    pub async fn poll_due(&self) -> Vec<String> {
        self.core.write().await.drain_due(Instant::now())
    }

    /// Stream of keys marked due by the background prefetch tick.
    ///
    /// Returns `None` after the first call. Dropping the stream hands due
    /// keys back to [`AdaptiveCache::poll_due`].
    pub fn prefetch_stream(&self) -> Option<UnboundedReceiverStream<String>> {
        let rx = self.due_rx.lock().unwrap_or_else(|e| e.into_inner()).take()?;
        self.streaming.store(true, Ordering::Release);
        Some(UnboundedReceiverStream::new(rx))
    }

    /// Refresh every currently due key through `refresher`.
    ///
    /// Refresh failures are logged and skipped. Returns the number of keys
    /// refreshed.
    pub async fn refresh_due<R>(&self, refresher: &R) -> usize
    where
        R: Refresher<V> + ?Sized,
    {
        let due = self.poll_due().await;
        let mut refreshed = 0;
        for key in due {
            if self.refresh_key(&key, refresher).await {
                refreshed += 1;
            }
        }
        refreshed
    }

    /// Refresh one key through `refresher`, storing the result with its
    /// measured compute cost. Does not count as a read.
    pub async fn refresh_key<R>(&self, key: &str, refresher: &R) -> bool
    where
        R: Refresher<V> + ?Sized,
    {
        let started = Instant::now();
        match refresher.refresh(key).await {
            Ok(value) => {
                self.set_with(key, value, SetOptions::with_cost(started.elapsed()))
                    .await;
                true
            }
            Err(e) => {
                warn!(key, "Prefetch refresh failed: {e}");
                false
            }
        }
    }

    /// Drop all entries, patterns and pending prefetches; reset statistics.
    pub async fn clear(&self) {
        self.core.write().await.clear();
    }

    /// Stop background tasks and release all state.
    pub async fn destroy(&self) {
        self.abort_tasks();
        self.clear().await;
        info!("Cache destroyed");
    }

    /// Shared handle to the core, for callers composing their own scheduling.
    pub fn core(&self) -> SharedCore<V> {
        self.core.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn abort_tasks(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl<V: CacheValue> Drop for AdaptiveCache<V> {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    // First tick is one period out, not immediate.
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

fn spawn_maintenance<V: CacheValue>(core: SharedCore<V>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = ticker(period);
        loop {
            interval.tick().await;
            let report = core.write().await.run_maintenance(Instant::now());
            debug!(
                expired = report.expired,
                patterns_pruned = report.patterns_pruned,
                "Maintenance tick"
            );
        }
    })
}

fn spawn_prefetch_tick<V: CacheValue>(
    core: SharedCore<V>,
    period: Duration,
    due_tx: mpsc::UnboundedSender<String>,
    streaming: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = ticker(period);
        loop {
            interval.tick().await;
            // No stream consumer: leave due keys for poll_due.
            if !streaming.load(Ordering::Acquire) || due_tx.is_closed() {
                continue;
            }
            let due = core.write().await.drain_due(Instant::now());
            for key in due {
                debug!(key = %key, "Key due for prefetch");
                if due_tx.send(key).is_err() {
                    warn!("Prefetch stream dropped mid-tick");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = Config {
            min_ttl_ms: 2,
            max_ttl_ms: 1,
            ..Default::default()
        };
        assert!(AdaptiveCache::<String>::new(config).is_err());
    }

    #[tokio::test]
    async fn test_factory_error_stores_nothing() {
        let cache: AdaptiveCache<String> = AdaptiveCache::new(Config::default()).unwrap();
        let result: Result<String, &str> = cache
            .get_or_compute("k", || async { Err("origin down") }, None)
            .await;
        assert_eq!(result, Err("origin down"));
        assert_eq!(cache.get_size().await, 0);
    }

    #[tokio::test]
    async fn test_prefetch_stream_taken_once() {
        let cache: AdaptiveCache<String> = AdaptiveCache::new(Config::default()).unwrap();
        assert!(cache.prefetch_stream().is_some());
        assert!(cache.prefetch_stream().is_none());
    }
}
