//! adaptive-cache: synthetic workload driver.
//!
//! Runs a set of readers against an [`AdaptiveCache`] backed by a slow
//! simulated origin. Each key is read on its own fixed period so the cache
//! can learn rhythms, adapt TTLs and mark keys due for prefetch. Due keys
//! are refreshed from the origin as they arrive. Prints the final stats as
//! JSON and the prometheus exposition.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use adaptive_cache::cache::Refresher;
use adaptive_cache::config::{Cli, Config};
use adaptive_cache::metrics::PrometheusSink;
use adaptive_cache::AdaptiveCache;

/// Simulated origin with a fixed latency.
struct Origin {
    latency: Duration,
    calls: AtomicU64,
}

impl Origin {
    async fn fetch(&self, key: &str) -> Result<String, std::io::Error> {
        tokio::time::sleep(self.latency).await;
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(format!(r#"{{"key":"{key}","version":{n},"body":"{}"}}"#, "x".repeat(2048)))
    }
}

#[async_trait]
impl Refresher<String> for Origin {
    type Error = std::io::Error;

    async fn refresh(&self, key: &str) -> Result<String, Self::Error> {
        self.fetch(key).await
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "adaptive_cache=debug"
    } else {
        "adaptive_cache=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| filter.into());
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }

    info!("adaptive-cache v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let config = Config::load(&cli.config)?;
    info!(
        max_size = config.max_size,
        default_ttl_ms = config.default_ttl_ms,
        min_ttl_ms = config.min_ttl_ms,
        max_ttl_ms = config.max_ttl_ms,
        predictive = config.enable_predictive,
        compression = config.enable_compression,
        "Configuration loaded"
    );

    let sink = Arc::new(PrometheusSink::new()?);
    let cache: Arc<AdaptiveCache<String>> =
        Arc::new(AdaptiveCache::with_sink(config, sink.clone())?);
    cache.start();

    let origin = Arc::new(Origin {
        latency: Duration::from_millis(150),
        calls: AtomicU64::new(0),
    });

    // Refresh keys as the prefetch tick marks them due.
    let refresher = cache.prefetch_stream().map(|mut due| {
        let cache = cache.clone();
        let origin = origin.clone();
        tokio::spawn(async move {
            while let Some(key) = due.next().await {
                if cache.refresh_key(&key, origin.as_ref()).await {
                    debug!(key = %key, "Prefetched");
                }
            }
        })
    });

    let readers = (0..cli.keys).map(|i| {
        let cache = cache.clone();
        let origin = origin.clone();
        let period = Duration::from_millis(cli.period_ms * (1 + (i % 4) as u64));
        let rounds = cli.rounds;
        async move {
            let key = format!("resource:{i}");
            for _ in 0..rounds {
                let fetched = cache
                    .get_or_compute(&key, || origin.fetch(&key), None)
                    .await;
                if let Err(e) = fetched {
                    tracing::warn!(key = %key, "Origin fetch failed: {e}");
                }
                tokio::time::sleep(period).await;
            }
        }
    });
    futures::future::join_all(readers).await;

    let stats = cache.get_stats().await;
    info!(
        hits = stats.hits,
        misses = stats.misses,
        hit_rate = stats.hit_rate,
        origin_calls = origin.calls.load(Ordering::Relaxed),
        "Workload complete"
    );

    cache.destroy().await;
    if let Some(task) = refresher {
        task.abort();
    }

    println!("{}", serde_json::to_string_pretty(&stats)?);
    println!("{}", sink.render());

    Ok(())
}
