//! Cache statistics.

use serde::{Deserialize, Serialize};

/// Process-lifetime counters, reset only by `clear`.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries removed by capacity eviction.
    pub evictions: u64,
    /// Entries removed because their TTL ran out (lazily or by sweep).
    pub expirations: u64,
    /// Bytes saved by compression across all stores.
    pub compression_saved: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Read-only view returned by `get_stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub compression_saved: u64,
    pub hit_rate: f64,
    pub memory_usage_estimate: usize,
    pub prediction_accuracy: f64,
    pub entries: usize,
    pub tracked_patterns: usize,
    pub pending_prefetches: usize,
    /// Prefetch requests registered.
    pub prefetch_scheduled: u64,
    /// Prefetch requests that reached their fire time.
    pub prefetch_due: u64,
    /// Pending requests dropped by invalidation or eviction.
    pub prefetch_cancelled: u64,
    /// Predictions too near or too far to schedule.
    pub prefetch_skipped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let mut stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        stats.hits = 3;
        stats.misses = 1;
        assert_eq!(stats.hit_rate(), 0.75);
    }
}
