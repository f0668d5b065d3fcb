//! Cache core: the entry store and everything that acts on it.
//!
//! The core is the central coordinator for the cache. It:
//! - Holds all entries and per-key access patterns
//! - Runs the TTL calculator on every store
//! - Triggers eviction when the store is full
//! - Registers predicted reads with the prefetch scheduler
//! - Keeps hit/miss/eviction accounting
//!
//! All methods are synchronous and take `now` explicitly; locking and
//! background scheduling live in [`crate::cache::adaptive`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::compressor::{Compressed, Compressor};
use crate::cache::entry::{CacheEntry, Payload};
use crate::cache::evictor::Evictor;
use crate::cache::pattern::{AccessPattern, Pattern, PatternTracker};
use crate::cache::prefetcher::PrefetchScheduler;
use crate::cache::stats::{CacheStats, StatsSnapshot};
use crate::cache::ttl::{TtlCalculator, TtlInputs};
use crate::cache::value::CacheValue;
use crate::config::Config;
use crate::metrics::{MetricEvent, MetricsSink, NoopSink};

/// Per-call options for `set`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Use this TTL verbatim instead of computing one.
    pub ttl: Option<Duration>,
    /// Wall time taken to produce the value.
    pub compute_cost: Option<Duration>,
}

impl SetOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Default::default()
        }
    }

    pub fn with_cost(compute_cost: Duration) -> Self {
        Self {
            compute_cost: Some(compute_cost),
            ..Default::default()
        }
    }
}

/// What one maintenance cycle removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub expired: usize,
    pub patterns_pruned: usize,
}

/// The cache core.
pub struct CacheCore<V> {
    /// Live entries indexed by key.
    entries: HashMap<String, CacheEntry<V>>,

    /// Access patterns, keyed independently of `entries`.
    patterns: PatternTracker,

    ttl: TtlCalculator,

    evictor: Evictor,

    prefetcher: PrefetchScheduler,

    compressor: Compressor,

    stats: CacheStats,

    sink: Arc<dyn MetricsSink>,

    config: Arc<Config>,
}

impl<V: CacheValue> CacheCore<V> {
    /// Create a core with a no-op metrics sink.
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_sink(config, Arc::new(NoopSink))
    }

    pub fn with_sink(config: Arc<Config>, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            entries: HashMap::new(),
            patterns: PatternTracker::new(config.pattern.clone()),
            ttl: TtlCalculator::new(&config),
            evictor: Evictor::new(config.eviction.clone()),
            prefetcher: PrefetchScheduler::new(config.prefetch.clone()),
            compressor: Compressor::new(
                config.compression.clone(),
                config.compression_threshold,
                config.enable_compression,
            ),
            stats: CacheStats::default(),
            sink,
            config,
        }
    }

    /// Look up `key`, recording the read in its access pattern.
    ///
    /// The pattern is updated before expiry is checked so predictions stay
    /// current for keys about to expire. Expired entries are removed here.
    pub fn get(&mut self, key: &str, now: Instant) -> Option<V> {
        self.patterns.record_access(key, now);

        let expired = match self.entries.get(key) {
            None => {
                self.record_miss(key);
                return None;
            }
            Some(entry) => entry.is_expired(now),
        };

        if expired {
            self.entries.remove(key);
            self.stats.expirations += 1;
            self.sink.record(&MetricEvent::Expired {
                key: key.to_string(),
            });
            debug!(key, "Lazily expired entry");
            self.record_miss(key);
            return None;
        }

        let pattern = self.patterns.detect_pattern(key);
        let entry = self.entries.get_mut(key)?;
        entry.touch(now, pattern);

        let value = match &entry.payload {
            Payload::Plain(value) => Ok(value.clone()),
            Payload::Compressed(data) => self
                .compressor
                .decompress(data)
                .and_then(|raw| V::decode(&raw)),
        };

        match value {
            Ok(value) => {
                self.stats.hits += 1;
                self.sink.record(&MetricEvent::Hit {
                    key: key.to_string(),
                });
                Some(value)
            }
            Err(e) => {
                warn!(key, "Dropping undecodable entry: {e}");
                self.entries.remove(key);
                self.record_miss(key);
                None
            }
        }
    }

    /// Store `value` under `key`.
    pub fn set(&mut self, key: &str, value: V, options: SetOptions, now: Instant) {
        let compute_cost = options.compute_cost.unwrap_or(Duration::ZERO);
        let pattern = self.patterns.detect_pattern(key);
        let predicted = self.patterns.predicted_next_access(key);

        let ttl = match options.ttl {
            Some(ttl) => ttl,
            None => self.ttl.compute(
                &TtlInputs {
                    compute_cost,
                    pattern,
                    predicted_next_access: predicted,
                    existing_popularity: self.entries.get(key).map(|e| e.popularity),
                },
                now,
            ),
        };

        let (payload, size_bytes) = self.encode_payload(key, value);

        if !self.entries.contains_key(key) && self.entries.len() >= self.config.max_size {
            self.evict(now);
        }

        self.entries.insert(
            key.to_string(),
            CacheEntry::new(payload, size_bytes, ttl, compute_cost, pattern, now),
        );

        debug!(
            key,
            ttl_ms = ttl.as_millis() as u64,
            %pattern,
            size_bytes,
            "Stored entry"
        );

        if self.config.enable_predictive {
            if let Some(predicted) = predicted {
                let event = if self.prefetcher.schedule(key, predicted, now) {
                    MetricEvent::PrefetchScheduled {
                        key: key.to_string(),
                    }
                } else {
                    MetricEvent::PrefetchSkipped {
                        key: key.to_string(),
                    }
                };
                self.sink.record(&event);
            }
        }
    }

    /// Encode and, when worthwhile, compress a value. Codec failures fall
    /// back to storing the value as-is.
    ///
    /// A value that cannot be encoded is sized by its in-memory footprint.
    fn encode_payload(&mut self, key: &str, value: V) -> (Payload<V>, usize) {
        let raw = match value.encode() {
            Ok(raw) => raw,
            Err(e) => {
                let size_bytes = std::mem::size_of_val(&value).max(1);
                warn!(
                    key,
                    size_bytes, "Failed to encode value, storing uncompressed with nominal size: {e}"
                );
                return (Payload::Plain(value), size_bytes);
            }
        };

        match self.compressor.compress(&raw) {
            Ok(Compressed::Packed { data, saved }) => {
                self.stats.compression_saved += saved as u64;
                self.sink.record(&MetricEvent::Compression {
                    key: key.to_string(),
                    original_size: raw.len(),
                    compressed_size: data.len(),
                });
                let size = data.len();
                (Payload::Compressed(Bytes::from(data)), size)
            }
            Ok(Compressed::Skipped) => (Payload::Plain(value), raw.len()),
            Err(e) => {
                warn!(key, "Compression failed, storing uncompressed: {e}");
                (Payload::Plain(value), raw.len())
            }
        }
    }

    /// Remove `key`, its access pattern and any pending prefetch.
    pub fn invalidate(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        self.patterns.remove(key);
        self.cancel_prefetch(key);
        removed
    }

    /// Invalidate every key the predicate accepts. Returns entries removed.
    pub fn invalidate_matching(&mut self, predicate: impl Fn(&str) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !predicate(key.as_str()));
        self.patterns.remove_matching(&predicate);
        for key in self.prefetcher.cancel_matching(&predicate) {
            self.sink.record(&MetricEvent::PrefetchCancelled { key });
        }
        before - self.entries.len()
    }

    /// Run one round of capacity eviction.
    ///
    /// Removes the lowest-scoring `max(1, eviction_fraction × max_size)`
    /// entries. Returns the number of entries evicted.
    pub fn evict(&mut self, now: Instant) -> usize {
        let count = self.evictor.victim_count(self.config.max_size);
        let victims = self.evictor.select_victims(self.entries.iter(), count, now);

        let mut evicted = 0;
        for victim in victims {
            if self.entries.remove(&victim.key).is_some() {
                self.cancel_prefetch(&victim.key);
                debug!(key = %victim.key, score = victim.score, "Evicted entry");
                self.sink.record(&MetricEvent::Eviction {
                    key: victim.key,
                    score: victim.score,
                });
                evicted += 1;
            }
        }

        self.stats.evictions += evicted as u64;
        if evicted > 0 {
            info!(evicted, remaining = self.entries.len(), "Eviction round complete");
        }
        evicted
    }

    /// Remove every entry whose age exceeds its TTL, regardless of store size.
    pub fn sweep_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.entries.remove(key);
            self.sink.record(&MetricEvent::Expired { key: key.clone() });
        }
        self.stats.expirations += expired.len() as u64;
        expired.len()
    }

    /// Drop access patterns for keys with no entry that went unread too long.
    pub fn prune_patterns(&mut self, now: Instant) -> usize {
        let entries = &self.entries;
        self.patterns.prune_stale(now, |key| entries.contains_key(key))
    }

    /// Sweep expired entries and stale patterns.
    pub fn run_maintenance(&mut self, now: Instant) -> MaintenanceReport {
        let report = MaintenanceReport {
            expired: self.sweep_expired(now),
            patterns_pruned: self.prune_patterns(now),
        };
        if report.expired > 0 || report.patterns_pruned > 0 {
            info!(
                expired = report.expired,
                patterns_pruned = report.patterns_pruned,
                entries = self.entries.len(),
                "Maintenance round complete"
            );
        }
        report
    }

    /// Keys whose prefetch time has come.
    pub fn drain_due(&mut self, now: Instant) -> Vec<String> {
        let due = self.prefetcher.drain_due(now);
        for key in &due {
            self.sink.record(&MetricEvent::PrefetchDue { key: key.clone() });
        }
        due
    }

    pub fn stats(&self) -> StatsSnapshot {
        let prefetch = self.prefetcher.stats();
        StatsSnapshot {
            hits: self.stats.hits,
            misses: self.stats.misses,
            evictions: self.stats.evictions,
            expirations: self.stats.expirations,
            compression_saved: self.stats.compression_saved,
            hit_rate: self.stats.hit_rate(),
            memory_usage_estimate: self.entries.values().map(CacheEntry::memory_estimate).sum(),
            prediction_accuracy: self.patterns.prediction_accuracy(),
            entries: self.entries.len(),
            tracked_patterns: self.patterns.len(),
            pending_prefetches: self.prefetcher.pending_count(),
            prefetch_scheduled: prefetch.total_scheduled,
            prefetch_due: prefetch.total_due,
            prefetch_cancelled: prefetch.total_cancelled,
            prefetch_skipped: prefetch.total_skipped,
        }
    }

    pub fn detect_pattern(&self, key: &str) -> Pattern {
        self.patterns.detect_pattern(key)
    }

    pub fn access_pattern(&self, key: &str) -> Option<&AccessPattern> {
        self.patterns.get(key)
    }

    /// Entry metadata without recording an access.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Drop all entries, patterns and pending prefetches; reset statistics.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.patterns.clear();
        self.prefetcher.clear();
        self.stats = CacheStats::default();
    }

    fn cancel_prefetch(&mut self, key: &str) {
        if self.prefetcher.cancel(key) {
            self.sink.record(&MetricEvent::PrefetchCancelled {
                key: key.to_string(),
            });
        }
    }

    fn record_miss(&mut self, key: &str) {
        self.stats.misses += 1;
        self.sink.record(&MetricEvent::Miss {
            key: key.to_string(),
        });
    }
}
