//! Eviction policy: decides which entries to drop under capacity pressure.
//!
//! Uses a weighted scoring function combining:
//! - Age normalized by the entry's TTL
//! - Minutes since last access
//! - Popularity (subtracted)
//!
//! Entries are removed lowest score first.

use std::collections::BinaryHeap;

use tokio::time::Instant;

use crate::cache::entry::CacheEntry;
use crate::config::EvictionConfig;

/// An eviction candidate with its computed score.
#[derive(Debug, Clone)]
pub struct EvictionCandidate {
    pub key: String,
    pub score: f64,
}

// Lower score = higher eviction priority, so the heap order is reversed.
impl PartialEq for EvictionCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score
    }
}

impl Eq for EvictionCandidate {}

impl PartialOrd for EvictionCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EvictionCandidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    }
}

/// The eviction policy engine.
pub struct Evictor {
    config: EvictionConfig,
}

impl Evictor {
    pub fn new(config: EvictionConfig) -> Self {
        Self { config }
    }

    /// Compute the eviction score for a single entry.
    ///
    /// ```text
    /// score(entry) =
    ///     α × (age / ttl) +
    ///     β × (minutes since last access) −
    ///     γ × popularity
    /// ```
    pub fn compute_score<V>(&self, entry: &CacheEntry<V>, now: Instant) -> f64 {
        self.config.alpha * entry.normalized_age(now) + self.config.beta * entry.idle_minutes(now)
            - self.config.gamma * entry.popularity
    }

    /// Entries removed per eviction round for a store capped at `max_size`.
    pub fn victim_count(&self, max_size: usize) -> usize {
        ((max_size as f64 * self.config.eviction_fraction).floor() as usize).max(1)
    }

    /// Select up to `count` entries to evict.
    ///
    /// Returns keys ordered by eviction priority (lowest score first).
    pub fn select_victims<'a, V: 'a>(
        &self,
        entries: impl Iterator<Item = (&'a String, &'a CacheEntry<V>)>,
        count: usize,
        now: Instant,
    ) -> Vec<EvictionCandidate> {
        let mut heap = BinaryHeap::new();

        for (key, entry) in entries {
            let score = self.compute_score(entry, now);
            heap.push(EvictionCandidate {
                key: key.clone(),
                score,
            });
        }

        let mut victims = Vec::with_capacity(count.min(heap.len()));
        for _ in 0..count {
            if let Some(candidate) = heap.pop() {
                victims.push(candidate);
            } else {
                break;
            }
        }

        victims
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;
    use crate::cache::entry::Payload;
    use crate::cache::pattern::Pattern;

    fn make_entry(created: Instant, ttl_secs: u64, popularity: f64) -> CacheEntry<String> {
        let mut entry = CacheEntry::new(
            Payload::Plain(String::new()),
            0,
            Duration::from_secs(ttl_secs),
            Duration::ZERO,
            Pattern::Unknown,
            created,
        );
        entry.popularity = popularity;
        entry
    }

    #[test]
    fn test_eviction_prefers_low_score() {
        let evictor = Evictor::new(EvictionConfig::default());
        let t0 = Instant::now();
        let now = t0 + Duration::from_secs(120);

        let mut entries = HashMap::new();
        // Old and idle: high score, kept.
        entries.insert("old".to_string(), make_entry(t0, 300, 0.1));
        // Just created and popular: lowest score.
        entries.insert("fresh".to_string(), make_entry(now, 300, 0.9));
        entries.insert("middle".to_string(), make_entry(t0 + Duration::from_secs(60), 300, 0.5));

        let victims = evictor.select_victims(entries.iter(), 1, now);
        assert_eq!(victims.len(), 1);
        assert_eq!(victims[0].key, "fresh");
    }

    #[test]
    fn test_victims_ordered_ascending() {
        let evictor = Evictor::new(EvictionConfig::default());
        let now = Instant::now();
        let mut entries = HashMap::new();
        for (i, popularity) in [0.2, 0.8, 0.5].into_iter().enumerate() {
            entries.insert(format!("k{i}"), make_entry(now, 300, popularity));
        }

        let victims = evictor.select_victims(entries.iter(), 3, now);
        let keys: Vec<_> = victims.iter().map(|v| v.key.as_str()).collect();
        assert_eq!(keys, ["k1", "k2", "k0"]);
    }

    #[test]
    fn test_victim_count() {
        let evictor = Evictor::new(EvictionConfig::default());
        assert_eq!(evictor.victim_count(10), 1);
        assert_eq!(evictor.victim_count(5), 1);
        assert_eq!(evictor.victim_count(1000), 100);
    }
}
