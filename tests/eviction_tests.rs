//! Integration tests for the eviction policy.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use adaptive_cache::cache::entry::{CacheEntry, Payload};
use adaptive_cache::cache::evictor::Evictor;
use adaptive_cache::cache::pattern::Pattern;
use adaptive_cache::cache::{CacheCore, SetOptions};
use adaptive_cache::config::{Config, EvictionConfig};

fn make_test_entry(created: Instant, popularity: f64) -> CacheEntry<String> {
    let mut entry = CacheEntry::new(
        Payload::Plain("v".to_string()),
        1,
        Duration::from_secs(300),
        Duration::ZERO,
        Pattern::Unknown,
        created,
    );
    entry.popularity = popularity;
    entry
}

fn core_with_capacity(max_size: usize) -> CacheCore<String> {
    CacheCore::new(Arc::new(Config {
        max_size,
        ..Default::default()
    }))
}

#[test]
fn test_eviction_order_by_popularity() {
    let config = EvictionConfig {
        alpha: 0.0,
        beta: 0.0,
        gamma: 1.0, // only popularity matters
        ..Default::default()
    };
    let evictor = Evictor::new(config);
    let now = Instant::now();

    let entries = vec![
        ("a".to_string(), make_test_entry(now, 0.1)),
        ("b".to_string(), make_test_entry(now, 0.9)),
        ("c".to_string(), make_test_entry(now, 0.5)),
        ("d".to_string(), make_test_entry(now, 0.95)),
    ];

    let victims = evictor.select_victims(entries.iter().map(|(k, e)| (k, e)), 2, now);
    assert_eq!(victims.len(), 2);

    // Highest popularity gives the lowest score and goes first.
    assert_eq!(victims[0].key, "d");
    assert_eq!(victims[1].key, "b");
}

#[test]
fn test_eviction_empty_returns_nothing() {
    let evictor = Evictor::new(EvictionConfig::default());
    let entries: Vec<(String, CacheEntry<String>)> = vec![];
    let victims = evictor.select_victims(entries.iter().map(|(k, e)| (k, e)), 5, Instant::now());
    assert!(victims.is_empty());
}

#[test]
fn test_capacity_eviction_scenario() {
    let mut core = core_with_capacity(10);
    let now = Instant::now();

    for i in 0..10 {
        core.set(&format!("k{i}"), "v".into(), SetOptions::default(), now);
    }
    assert_eq!(core.len(), 10);

    core.set("k10", "v".into(), SetOptions::default(), now + Duration::from_secs(1));

    assert!(core.len() <= 10);
    assert!(core.contains("k10"));
    let survivors = (0..10).filter(|i| core.contains(&format!("k{i}"))).count();
    assert!(survivors < 10);
    assert_eq!(core.stats().evictions, 1);
}

#[test]
fn test_eviction_shrinks_by_at_least_one_and_at_most_size() {
    for max_size in [1, 3, 10, 25] {
        let mut core = core_with_capacity(max_size);
        let now = Instant::now();
        for i in 0..max_size {
            core.set(&format!("k{i}"), "v".into(), SetOptions::default(), now);
        }

        let before = core.len();
        let evicted = core.evict(now);
        assert!(evicted >= 1);
        assert!(evicted <= before);
        assert_eq!(core.len(), before - evicted);
    }
}

#[test]
fn test_ten_percent_evicted_from_large_store() {
    let mut core = core_with_capacity(100);
    let now = Instant::now();
    for i in 0..100 {
        core.set(&format!("k{i}"), "v".into(), SetOptions::default(), now);
    }
    core.set("overflow", "v".into(), SetOptions::default(), now);
    assert_eq!(core.len(), 91);
}

#[test]
fn test_sweep_removes_expired_regardless_of_size() {
    let mut core = core_with_capacity(100);
    let now = Instant::now();
    core.set("short", "v".into(), SetOptions::with_ttl(Duration::from_secs(1)), now);
    core.set("long", "v".into(), SetOptions::with_ttl(Duration::from_secs(600)), now);

    assert_eq!(core.sweep_expired(now + Duration::from_secs(2)), 1);
    assert!(!core.contains("short"));
    assert!(core.contains("long"));
    assert_eq!(core.stats().expirations, 1);
}
