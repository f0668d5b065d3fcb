//! adaptive-cache: a self-tuning in-process cache.
//!
//! Learns how often each key is read and uses that to:
//!   - derive per-entry TTLs from access rhythm and recompute cost
//!   - evict by a score over age, recency and popularity
//!   - mark keys due for refresh shortly before their predicted next read
//!
//! Large values are zstd-compressed; statistics and metric events are
//! exposed read-only.

pub mod cache;
pub mod config;
pub mod metrics;

pub use cache::{AdaptiveCache, CacheValue, Pattern, SetOptions, StatsSnapshot};
pub use config::{Config, ConfigError};
pub use metrics::{MetricEvent, MetricsSink};
