//! Cache entry types.
//!
//! An entry holds one stored value plus the metadata the TTL calculator and
//! the eviction policy score it by.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::cache::pattern::Pattern;

/// Size multiplier applied to stored bytes when estimating memory usage.
pub const MEMORY_ESTIMATE_FACTOR: usize = 2;

/// Accesses after which the access factor of popularity saturates.
const POPULARITY_ACCESS_SATURATION: f64 = 10.0;

/// Minutes of idleness after which the recency factor reaches zero.
const POPULARITY_RECENCY_MINUTES: f64 = 5.0;

/// How a value is held in memory.
#[derive(Debug, Clone)]
pub enum Payload<V> {
    /// The value itself.
    Plain(V),
    /// zstd-compressed encoded bytes.
    Compressed(Bytes),
}

impl<V> Payload<V> {
    pub fn is_compressed(&self) -> bool {
        matches!(self, Payload::Compressed(_))
    }
}

/// A single cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub payload: Payload<V>,

    /// Bytes held by `payload` (compressed size when compressed).
    pub size_bytes: usize,

    pub created_at: Instant,

    pub last_accessed_at: Instant,

    /// Expiry measured from `created_at`.
    pub ttl: Duration,

    /// Hits since creation.
    pub access_count: u64,

    /// Wall time the value took to produce; zero if unknown.
    pub compute_cost: Duration,

    /// Blend of age, access count and recency in [0, 1].
    pub popularity: f64,

    pub pattern: Pattern,
}

impl<V> CacheEntry<V> {
    pub fn new(
        payload: Payload<V>,
        size_bytes: usize,
        ttl: Duration,
        compute_cost: Duration,
        pattern: Pattern,
        now: Instant,
    ) -> Self {
        let mut entry = Self {
            payload,
            size_bytes,
            created_at: now,
            last_accessed_at: now,
            ttl,
            access_count: 0,
            compute_cost,
            popularity: 0.0,
            pattern,
        };
        entry.popularity = entry.compute_popularity(now);
        entry
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// Whether the entry has outlived its TTL.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.age(now) > self.ttl
    }

    /// Record a hit, updating timestamp, counter, popularity and pattern.
    pub fn touch(&mut self, now: Instant, pattern: Pattern) {
        self.last_accessed_at = now;
        self.access_count += 1;
        self.popularity = self.compute_popularity(now);
        self.pattern = pattern;
    }

    /// Age normalized by TTL; a zero TTL counts as fully aged.
    pub fn normalized_age(&self, now: Instant) -> f64 {
        let ttl = self.ttl.as_secs_f64();
        if ttl <= 0.0 {
            return 1.0;
        }
        self.age(now).as_secs_f64() / ttl
    }

    /// Minutes since the last hit (or since creation).
    pub fn idle_minutes(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.last_accessed_at).as_secs_f64() / 60.0
    }

    /// ```text
    /// popularity = 0.3 × max(0, 1 − age/ttl)
    ///            + 0.4 × min(1, access_count/10)
    ///            + 0.3 × max(0, 1 − idle_minutes/5)
    /// ```
    pub fn compute_popularity(&self, now: Instant) -> f64 {
        let time_decay = (1.0 - self.normalized_age(now)).max(0.0);
        let access_factor = (self.access_count as f64 / POPULARITY_ACCESS_SATURATION).min(1.0);
        let recency_factor = (1.0 - self.idle_minutes(now) / POPULARITY_RECENCY_MINUTES).max(0.0);
        (0.3 * time_decay + 0.4 * access_factor + 0.3 * recency_factor).clamp(0.0, 1.0)
    }

    pub fn memory_estimate(&self) -> usize {
        self.size_bytes * MEMORY_ESTIMATE_FACTOR
    }
}
