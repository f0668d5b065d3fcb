//! Metric events emitted by the cache.
//!
//! The cache reports hits, misses, evictions, compression and prefetch
//! activity to an injected [`MetricsSink`]. Delivery is fire-and-forget: a
//! sink must not block and cannot fail the operation that emitted the event.

use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use tracing::trace;

/// A significant cache operation.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricEvent {
    Hit { key: String },
    Miss { key: String },
    /// Entry dropped because its TTL ran out.
    Expired { key: String },
    /// Entry dropped under capacity pressure.
    Eviction { key: String, score: f64 },
    Compression {
        key: String,
        original_size: usize,
        compressed_size: usize,
    },
    PrefetchScheduled { key: String },
    /// Predicted access outside the scheduling window.
    PrefetchSkipped { key: String },
    /// Pending request dropped with its entry.
    PrefetchCancelled { key: String },
    PrefetchDue { key: String },
}

/// Receiver of cache metric events.
pub trait MetricsSink: Send + Sync {
    fn record(&self, event: &MetricEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn record(&self, _event: &MetricEvent) {}
}

/// Logs every event at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl MetricsSink for TracingSink {
    fn record(&self, event: &MetricEvent) {
        trace!(?event, "cache event");
    }
}

/// Counts events into prometheus counters on its own registry.
pub struct PrometheusSink {
    registry: Registry,
    hits: IntCounter,
    misses: IntCounter,
    expirations: IntCounter,
    evictions: IntCounter,
    compression_saved_bytes: IntCounter,
    prefetch_scheduled: IntCounter,
    prefetch_skipped: IntCounter,
    prefetch_cancelled: IntCounter,
    prefetch_due: IntCounter,
}

impl PrometheusSink {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let c = IntCounter::new(name, help)?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        Ok(Self {
            hits: counter("adaptive_cache_hits_total", "Cache hits")?,
            misses: counter("adaptive_cache_misses_total", "Cache misses")?,
            expirations: counter("adaptive_cache_expirations_total", "Entries expired by TTL")?,
            evictions: counter("adaptive_cache_evictions_total", "Entries evicted under capacity pressure")?,
            compression_saved_bytes: counter(
                "adaptive_cache_compression_saved_bytes_total",
                "Bytes saved by compression",
            )?,
            prefetch_scheduled: counter("adaptive_cache_prefetch_scheduled_total", "Prefetch requests scheduled")?,
            prefetch_skipped: counter(
                "adaptive_cache_prefetch_skipped_total",
                "Predictions outside the prefetch window",
            )?,
            prefetch_cancelled: counter(
                "adaptive_cache_prefetch_cancelled_total",
                "Prefetch requests cancelled",
            )?,
            prefetch_due: counter("adaptive_cache_prefetch_due_total", "Keys marked due for prefetch")?,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render all counters in the prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buf) {
            tracing::warn!("Failed to encode metrics: {e}");
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl MetricsSink for PrometheusSink {
    fn record(&self, event: &MetricEvent) {
        match event {
            MetricEvent::Hit { .. } => self.hits.inc(),
            MetricEvent::Miss { .. } => self.misses.inc(),
            MetricEvent::Expired { .. } => self.expirations.inc(),
            MetricEvent::Eviction { .. } => self.evictions.inc(),
            MetricEvent::Compression {
                original_size,
                compressed_size,
                ..
            } => self
                .compression_saved_bytes
                .inc_by(original_size.saturating_sub(*compressed_size) as u64),
            MetricEvent::PrefetchScheduled { .. } => self.prefetch_scheduled.inc(),
            MetricEvent::PrefetchSkipped { .. } => self.prefetch_skipped.inc(),
            MetricEvent::PrefetchCancelled { .. } => self.prefetch_cancelled.inc(),
            MetricEvent::PrefetchDue { .. } => self.prefetch_due.inc(),
        }
    }
}
