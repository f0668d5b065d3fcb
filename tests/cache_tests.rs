//! Integration tests for the cache API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use adaptive_cache::cache::{AdaptiveCache, Json, Pattern, SetOptions};
use adaptive_cache::config::Config;

fn new_cache(config: Config) -> AdaptiveCache<String> {
    AdaptiveCache::new(config).unwrap()
}

async fn read_at_intervals(cache: &AdaptiveCache<String>, key: &str, intervals_ms: &[u64]) {
    cache.get(key).await;
    for &gap in intervals_ms {
        tokio::time::advance(Duration::from_millis(gap)).await;
        cache.get(key).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_cold_miss_then_hit() {
    let cache = new_cache(Config::default());

    assert_eq!(cache.get("k").await, None);
    assert_eq!(cache.get_stats().await.misses, 1);

    cache.set("k", "v".to_string()).await;
    assert_eq!(cache.get("k").await, Some("v".to_string()));

    let stats = cache.get_stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hit_rate, 0.5);
}

#[tokio::test(start_paused = true)]
async fn test_expiry_without_intervening_set() {
    let cache = new_cache(Config::default());
    cache
        .set_with("k", "v".into(), SetOptions::with_ttl(Duration::from_secs(10)))
        .await;

    tokio::time::advance(Duration::from_secs(10)).await;
    assert_eq!(cache.get("k").await.as_deref(), Some("v"));

    tokio::time::advance(Duration::from_millis(1)).await;
    assert_eq!(cache.get("k").await, None);
    assert_eq!(cache.get_size().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_stable_pattern_classification() {
    let cache = new_cache(Config::default());
    read_at_intervals(&cache, "k", &[1000; 5]).await;
    assert_eq!(cache.detect_pattern("k").await, Pattern::Stable);
}

#[tokio::test(start_paused = true)]
async fn test_periodic_detection() {
    let cache = new_cache(Config::default());
    read_at_intervals(&cache, "k", &[100, 500, 100, 500, 100, 500]).await;
    assert_eq!(cache.detect_pattern("k").await, Pattern::Periodic);
}

#[tokio::test(start_paused = true)]
async fn test_adaptive_ttl_for_expensive_compute() {
    let cache = new_cache(Config::default());
    cache
        .set_with("k", "v".into(), SetOptions::with_cost(Duration::from_millis(2000)))
        .await;

    let core = cache.core();
    let core = core.read().await;
    let expected = Duration::from_millis(300_000 * 3).min(core.config().max_ttl());
    assert_eq!(core.peek("k").unwrap().ttl, expected);
}

#[tokio::test(start_paused = true)]
async fn test_stable_key_gets_longer_ttl() {
    let cache = new_cache(Config::default());
    read_at_intervals(&cache, "k", &[1000; 5]).await;
    cache.set("k", "v".into()).await;

    let core = cache.core();
    let ttl = core.read().await.peek("k").unwrap().ttl;
    assert_eq!(ttl, Duration::from_millis(600_000));
}

#[tokio::test(start_paused = true)]
async fn test_ttl_override_used_verbatim() {
    let cache = new_cache(Config::default());
    cache
        .set_with("k", "v".into(), SetOptions::with_ttl(Duration::from_secs(5)))
        .await;
    let core = cache.core();
    assert_eq!(core.read().await.peek("k").unwrap().ttl, Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn test_popularity_not_decreased_by_immediate_reaccess() {
    let cache = new_cache(Config::default());
    cache.set("k", "v".into()).await;
    tokio::time::advance(Duration::from_secs(30)).await;

    let core = cache.core();
    let mut last = core.read().await.peek("k").unwrap().popularity;
    for _ in 0..12 {
        cache.get("k").await;
        let popularity = core.read().await.peek("k").unwrap().popularity;
        assert!(popularity >= last);
        last = popularity;
    }
}

#[tokio::test(start_paused = true)]
async fn test_get_or_compute_caches_and_times_factory() {
    let cache = new_cache(Config::default());
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
        let value: Result<String, std::io::Error> = cache
            .get_or_compute(
                "report",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok("rendered".to_string())
                },
                None,
            )
            .await;
        assert_eq!(value.unwrap(), "rendered");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let core = cache.core();
    let core = core.read().await;
    let entry = core.peek("report").unwrap();
    assert!(entry.compute_cost >= Duration::from_millis(500));
    assert!(entry.compute_cost < Duration::from_millis(510));
    // Roughly 1 + 500/1000 = 1.5x the default.
    assert!(entry.ttl >= Duration::from_millis(450_000));
    assert!(entry.ttl < Duration::from_millis(455_000));
}

#[tokio::test(start_paused = true)]
async fn test_get_or_compute_ttl_override() {
    let cache = new_cache(Config::default());
    let value: Result<String, std::io::Error> = cache
        .get_or_compute("k", || async { Ok("v".to_string()) }, Some(Duration::from_secs(2)))
        .await;
    assert!(value.is_ok());

    tokio::time::advance(Duration::from_secs(3)).await;
    assert_eq!(cache.get("k").await, None);
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_and_matching() {
    let cache = new_cache(Config::default());
    for key in ["user:1", "user:2", "post:1"] {
        cache.set(key, "v".into()).await;
    }

    assert!(cache.invalidate("post:1").await);
    assert!(!cache.invalidate("post:1").await);
    assert_eq!(cache.invalidate_matching(|k| k.starts_with("user:")).await, 2);
    assert_eq!(cache.get_size().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_compression_stats_and_roundtrip() {
    let cache: AdaptiveCache<Json<Vec<String>>> = AdaptiveCache::new(Config::default()).unwrap();
    let rows: Vec<String> = (0..200).map(|i| format!("row-{}", i % 10)).collect();

    cache.set("rows", Json(rows.clone())).await;
    assert_eq!(cache.get("rows").await, Some(Json(rows)));

    let stats = cache.get_stats().await;
    assert!(stats.compression_saved > 0);
    assert!(stats.memory_usage_estimate > 0);
}

#[tokio::test(start_paused = true)]
async fn test_compression_disabled_stores_plain() {
    let cache = new_cache(Config {
        enable_compression: false,
        ..Default::default()
    });
    let big = "z".repeat(10_000);
    cache.set("big", big.clone()).await;

    let stats = cache.get_stats().await;
    assert_eq!(stats.compression_saved, 0);
    assert_eq!(stats.memory_usage_estimate, 20_000);
    assert_eq!(cache.get("big").await, Some(big));
}

#[tokio::test(start_paused = true)]
async fn test_prediction_accuracy_reported() {
    let cache = new_cache(Config::default());
    read_at_intervals(&cache, "steady", &[1000; 6]).await;
    read_at_intervals(&cache, "new", &[1000; 2]).await;

    // Only keys with five or more samples count.
    assert_eq!(cache.get_stats().await.prediction_accuracy, 1.0);
}

#[tokio::test(start_paused = true)]
async fn test_clear_resets_stats() {
    let cache = new_cache(Config::default());
    cache.get("k").await;
    cache.set("k", "v".into()).await;
    cache.clear().await;

    let stats = cache.get_stats().await;
    assert_eq!(stats.misses, 0);
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.tracked_patterns, 0);
}
