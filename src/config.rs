//! Runtime configuration for adaptive-cache.
//!
//! Configuration can be loaded from a JSON file or constructed programmatically.
//! The top-level knobs (capacity, TTL bounds, feature switches) sit directly on
//! [`Config`]; algorithm tuning lives in the nested sections.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Command-line arguments for the demo workload binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "adaptive-cache", about = "Adaptive cache synthetic workload")]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub json_logs: bool,

    /// Number of distinct keys in the workload.
    #[arg(long, default_value_t = 16)]
    pub keys: usize,

    /// Reads issued per key.
    #[arg(long, default_value_t = 12)]
    pub rounds: usize,

    /// Base read period per key in milliseconds (key `i` reads every `period * (1 + i % 4)`).
    #[arg(long, default_value_t = 2000)]
    pub period_ms: u64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("min_ttl ({min_ms}ms) exceeds max_ttl ({max_ms}ms)")]
    InvalidTtlBounds { min_ms: u64, max_ms: u64 },

    #[error("default_ttl ({default_ms}ms) outside [{min_ms}ms, {max_ms}ms]")]
    DefaultTtlOutOfBounds {
        default_ms: u64,
        min_ms: u64,
        max_ms: u64,
    },

    #[error("max_size must be at least 1")]
    ZeroCapacity,

    #[error("eviction_fraction must be in (0, 1], got {0}")]
    InvalidEvictionFraction(f64),

    #[error("{0} interval must be non-zero")]
    ZeroInterval(&'static str),

    #[error("pattern window ({window}) must hold at least two trend slices of {trend_window}")]
    WindowTooSmall { window: usize, trend_window: usize },
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Maximum number of live entries.
    pub max_size: usize,

    /// Base TTL before adaptive adjustments, in milliseconds.
    pub default_ttl_ms: u64,

    /// Upper TTL bound in milliseconds.
    pub max_ttl_ms: u64,

    /// Lower TTL bound in milliseconds.
    pub min_ttl_ms: u64,

    /// Encoded size in bytes above which values are compressed.
    pub compression_threshold: usize,

    /// Derive TTLs from cost, pattern and popularity.
    pub adaptive_ttl: bool,

    /// Schedule prefetch requests from predicted next accesses.
    pub enable_predictive: bool,

    /// Compress large values.
    pub enable_compression: bool,

    /// Access pattern tracking.
    pub pattern: PatternConfig,

    /// Adaptive TTL factors.
    pub ttl: TtlConfig,

    /// Eviction policy tuning.
    pub eviction: EvictionConfig,

    /// Compression settings.
    pub compression: CompressionConfig,

    /// Predictive prefetch settings.
    pub prefetch: PrefetchConfig,

    /// Background maintenance settings.
    pub maintenance: MaintenanceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_size: 1000,
            default_ttl_ms: 5 * 60 * 1000,
            max_ttl_ms: 60 * 60 * 1000,
            min_ttl_ms: 60 * 1000,
            compression_threshold: 1024,
            adaptive_ttl: true,
            enable_predictive: true,
            enable_compression: true,
            pattern: PatternConfig::default(),
            ttl: TtlConfig::default(),
            eviction: EvictionConfig::default(),
            compression: CompressionConfig::default(),
            prefetch: PrefetchConfig::default(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

/// Access pattern statistics and classification thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Maximum intervals kept per key.
    pub window_size: usize,

    /// Samples per slice when comparing recent vs prior intervals.
    pub trend_window: usize,

    /// Relative change beyond which a trend is reported.
    pub trend_threshold: f64,

    /// Intervals required before predicting the next access.
    pub min_prediction_samples: usize,

    /// Intervals required before classifying a pattern.
    pub min_classification_samples: usize,

    /// `variance < ratio * avg` classifies as stable.
    pub stable_variance_ratio: f64,

    /// `variance > ratio * avg` classifies as volatile.
    pub volatile_variance_ratio: f64,

    /// Lags compared against lag 1 for periodicity.
    pub periodic_lags: Vec<usize>,

    /// Autocorrelation ratio over lag 1 that counts as periodic.
    pub periodic_ratio: f64,

    /// Patterns without an entry and unread for this long are pruned.
    pub stale_after_ms: u64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            trend_window: 5,
            trend_threshold: 0.2,
            min_prediction_samples: 3,
            min_classification_samples: 5,
            stable_variance_ratio: 0.2,
            volatile_variance_ratio: 0.8,
            periodic_lags: vec![2, 3],
            periodic_ratio: 1.5,
            stale_after_ms: 60 * 60 * 1000,
        }
    }
}

/// Multipliers applied by the TTL calculator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
    /// Compute cost above which a value counts as expensive.
    pub expensive_cost_ms: u64,

    /// Cost divisor in `1 + cost / divisor`.
    pub cost_divisor_ms: f64,

    /// Cap on the cost multiplier.
    pub max_cost_multiplier: f64,

    pub stable_multiplier: f64,
    pub volatile_multiplier: f64,

    /// Popularity above which an existing entry gets boosted.
    pub popularity_threshold: f64,
    pub popularity_multiplier: f64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            expensive_cost_ms: 100,
            cost_divisor_ms: 1000.0,
            max_cost_multiplier: 3.0,
            stable_multiplier: 2.0,
            volatile_multiplier: 0.5,
            popularity_threshold: 0.7,
            popularity_multiplier: 1.5,
        }
    }
}

/// Eviction score weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvictionConfig {
    /// Weight for age normalized by TTL.
    pub alpha: f64,

    /// Weight for minutes since last access.
    pub beta: f64,

    /// Weight subtracted per unit of popularity.
    pub gamma: f64,

    /// Fraction of `max_size` removed per eviction round (at least one entry).
    pub eviction_fraction: f64,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            alpha: 0.4,
            beta: 0.4,
            gamma: 0.2,
            eviction_fraction: 0.1,
        }
    }
}

/// Compression settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// zstd compression level (1-22).
    pub zstd_level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self { zstd_level: 3 }
    }
}

/// Predictive prefetch window and tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// How long before the predicted access a key is marked due.
    pub lead_time_ms: u64,

    /// Predictions closer than this are not scheduled.
    pub min_horizon_ms: u64,

    /// Predictions further out than this are not scheduled.
    pub max_horizon_ms: u64,

    /// Interval of the background due-drain tick.
    pub tick_interval_ms: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            lead_time_ms: 5_000,
            min_horizon_ms: 5_000,
            max_horizon_ms: 60_000,
            tick_interval_ms: 5_000,
        }
    }
}

/// Background maintenance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Interval of the expiry sweep and pattern pruning.
    pub cleanup_interval_ms: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            cleanup_interval_ms: 60_000,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let config = if path.exists() {
            let data = std::fs::read_to_string(path)?;
            serde_json::from_str::<Config>(&data)?
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject bounds and intervals the cache cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.min_ttl_ms > self.max_ttl_ms {
            return Err(ConfigError::InvalidTtlBounds {
                min_ms: self.min_ttl_ms,
                max_ms: self.max_ttl_ms,
            });
        }
        if !(self.min_ttl_ms..=self.max_ttl_ms).contains(&self.default_ttl_ms) {
            return Err(ConfigError::DefaultTtlOutOfBounds {
                default_ms: self.default_ttl_ms,
                min_ms: self.min_ttl_ms,
                max_ms: self.max_ttl_ms,
            });
        }
        let fraction = self.eviction.eviction_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ConfigError::InvalidEvictionFraction(fraction));
        }
        if self.prefetch.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("prefetch tick"));
        }
        if self.maintenance.cleanup_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("cleanup"));
        }
        if self.pattern.window_size < 2 * self.pattern.trend_window {
            return Err(ConfigError::WindowTooSmall {
                window: self.pattern.window_size,
                trend_window: self.pattern.trend_window,
            });
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn min_ttl(&self) -> Duration {
        Duration::from_millis(self.min_ttl_ms)
    }

    pub fn max_ttl(&self) -> Duration {
        Duration::from_millis(self.max_ttl_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance.cleanup_interval_ms)
    }

    pub fn prefetch_tick(&self) -> Duration {
        Duration::from_millis(self.prefetch.tick_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.default_ttl_ms, 300_000);
        assert_eq!(cfg.eviction.alpha, 0.4);
        assert_eq!(cfg.pattern.window_size, 20);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_inverted_ttl_bounds_rejected() {
        let cfg = Config {
            min_ttl_ms: 10_000,
            max_ttl_ms: 5_000,
            default_ttl_ms: 5_000,
            ..Default::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InvalidTtlBounds {
                min_ms: 10_000,
                max_ms: 5_000
            })
        );
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let cfg = Config {
            max_size: 0,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroCapacity));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"max_size": 10, "eviction": {"alpha": 1.0}}"#).unwrap();
        assert_eq!(cfg.max_size, 10);
        assert_eq!(cfg.eviction.alpha, 1.0);
        assert_eq!(cfg.eviction.beta, 0.4);
        assert_eq!(cfg.min_ttl_ms, 60_000);
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(cfg.max_size, 1000);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"max_size": 0}"#).unwrap();
        assert!(Config::load(&path).is_err());
    }
}
