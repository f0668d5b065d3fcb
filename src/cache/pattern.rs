//! Access pattern tracking: learns how often each key is read.
//!
//! Every read appends the gap since the previous read to a bounded window.
//! From that window the tracker derives mean, variance, trend, a predicted
//! next access, and a coarse [`Pattern`] classification used by the TTL
//! calculator and the prefetch scheduler.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::PatternConfig;

/// Coarse classification of a key's read rhythm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pattern {
    /// Regular reads with low variance.
    Stable,
    /// Irregular reads with high variance.
    Volatile,
    /// Repeating cycle of distinct intervals.
    Periodic,
    /// Too few samples, or no threshold met.
    Unknown,
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pattern::Stable => write!(f, "stable"),
            Pattern::Volatile => write!(f, "volatile"),
            Pattern::Periodic => write!(f, "periodic"),
            Pattern::Unknown => write!(f, "unknown"),
        }
    }
}

/// Direction the read interval is drifting in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    /// Reads are getting further apart.
    Increasing,
    /// Reads are getting closer together.
    Decreasing,
    Stable,
}

/// Interval statistics for one key.
#[derive(Debug, Clone)]
pub struct AccessPattern {
    /// Gaps between consecutive reads, in milliseconds, oldest first.
    intervals: VecDeque<f64>,

    /// Time of the most recent read.
    pub last_access: Instant,

    /// Mean of `intervals`.
    pub avg_interval: f64,

    /// Population variance of `intervals`.
    pub variance: f64,

    pub trend: Trend,

    /// Set once enough intervals exist to extrapolate.
    pub predicted_next_access: Option<Instant>,
}

impl AccessPattern {
    /// Start tracking at the first observed read.
    pub fn new(now: Instant) -> Self {
        Self {
            intervals: VecDeque::new(),
            last_access: now,
            avg_interval: 0.0,
            variance: 0.0,
            trend: Trend::Stable,
            predicted_next_access: None,
        }
    }

    /// Fold a new read into the statistics.
    pub fn record(&mut self, now: Instant, config: &PatternConfig) {
        let interval = now.saturating_duration_since(self.last_access);
        self.last_access = now;

        self.intervals.push_back(interval.as_nanos() as f64 / 1_000_000.0);
        while self.intervals.len() > config.window_size {
            self.intervals.pop_front();
        }

        self.avg_interval = mean(self.intervals.iter().copied());
        self.variance = self
            .intervals
            .iter()
            .map(|x| (x - self.avg_interval).powi(2))
            .sum::<f64>()
            / self.intervals.len() as f64;
        self.trend = self.compute_trend(config);

        self.predicted_next_access = if self.intervals.len() >= config.min_prediction_samples {
            let next_ms = self.predict_next_interval(config).max(0.0);
            Some(now + Duration::from_secs_f64(next_ms / 1000.0))
        } else {
            None
        };
    }

    /// Number of recorded intervals.
    pub fn sample_count(&self) -> usize {
        self.intervals.len()
    }

    pub fn intervals(&self) -> impl Iterator<Item = f64> + '_ {
        self.intervals.iter().copied()
    }

    /// Expected gap until the next read, in milliseconds.
    ///
    /// Blends the trend-adjusted mean with the mean of the latest three gaps.
    pub fn predict_next_interval(&self, config: &PatternConfig) -> f64 {
        let adjusted = match self.trend {
            Trend::Increasing => self.avg_interval * 1.1,
            Trend::Decreasing => self.avg_interval * 0.9,
            Trend::Stable => self.avg_interval,
        };
        let recent = mean(self.recent(config.min_prediction_samples.max(1)));
        (adjusted + recent) / 2.0
    }

    /// Mean of `x[i] * x[i + lag]` over all valid `i`; 0 when the window is too short.
    pub fn autocorrelation(&self, lag: usize) -> f64 {
        let n = self.intervals.len();
        if lag == 0 || n <= lag {
            return 0.0;
        }
        let products = (0..n - lag).map(|i| self.intervals[i] * self.intervals[i + lag]);
        mean(products)
    }

    /// Classify the rhythm. Checks run stable, periodic, volatile in that order.
    pub fn classify(&self, config: &PatternConfig) -> Pattern {
        if self.intervals.len() < config.min_classification_samples {
            return Pattern::Unknown;
        }
        if self.variance < config.stable_variance_ratio * self.avg_interval {
            return Pattern::Stable;
        }
        let base = self.autocorrelation(1);
        if base > 0.0
            && config
                .periodic_lags
                .iter()
                .any(|&lag| self.autocorrelation(lag) > config.periodic_ratio * base)
        {
            return Pattern::Periodic;
        }
        if self.variance > config.volatile_variance_ratio * self.avg_interval {
            return Pattern::Volatile;
        }
        Pattern::Unknown
    }

    /// Consistency score in [0, 1]: `1 - variance / avg`.
    pub fn consistency(&self) -> f64 {
        if self.avg_interval <= 0.0 {
            return if self.variance <= 0.0 { 1.0 } else { 0.0 };
        }
        (1.0 - self.variance / self.avg_interval).clamp(0.0, 1.0)
    }

    fn recent(&self, count: usize) -> impl Iterator<Item = f64> + '_ {
        self.intervals
            .iter()
            .skip(self.intervals.len().saturating_sub(count))
            .copied()
    }

    fn compute_trend(&self, config: &PatternConfig) -> Trend {
        let slice = config.trend_window;
        let n = self.intervals.len();
        if slice == 0 || n < slice * 2 {
            return Trend::Stable;
        }
        let recent = mean(self.intervals.range(n - slice..).copied());
        let prior = mean(self.intervals.range(n - 2 * slice..n - slice).copied());
        if prior <= 0.0 {
            return Trend::Stable;
        }
        let change = (recent - prior) / prior;
        if change > config.trend_threshold {
            Trend::Increasing
        } else if change < -config.trend_threshold {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Per-key access patterns.
///
/// Keyed independently of the entry store: a pattern outlives its entry so a
/// recreated entry inherits what was learned.
pub struct PatternTracker {
    patterns: HashMap<String, AccessPattern>,
    config: PatternConfig,
}

impl PatternTracker {
    pub fn new(config: PatternConfig) -> Self {
        Self {
            patterns: HashMap::new(),
            config,
        }
    }

    /// Record a read of `key` at `now`.
    pub fn record_access(&mut self, key: &str, now: Instant) {
        match self.patterns.get_mut(key) {
            Some(pattern) => pattern.record(now, &self.config),
            None => {
                self.patterns.insert(key.to_string(), AccessPattern::new(now));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&AccessPattern> {
        self.patterns.get(key)
    }

    /// Classification for `key`; `Unknown` when the key was never read.
    pub fn detect_pattern(&self, key: &str) -> Pattern {
        self.patterns
            .get(key)
            .map(|p| p.classify(&self.config))
            .unwrap_or(Pattern::Unknown)
    }

    pub fn predicted_next_access(&self, key: &str) -> Option<Instant> {
        self.patterns.get(key).and_then(|p| p.predicted_next_access)
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.patterns.remove(key).is_some()
    }

    /// Remove every pattern whose key the predicate accepts.
    pub fn remove_matching(&mut self, predicate: impl Fn(&str) -> bool) -> usize {
        let before = self.patterns.len();
        self.patterns.retain(|key, _| !predicate(key.as_str()));
        before - self.patterns.len()
    }

    /// Drop patterns that have no live entry and have not been read recently.
    pub fn prune_stale(&mut self, now: Instant, has_entry: impl Fn(&str) -> bool) -> usize {
        let stale_after = Duration::from_millis(self.config.stale_after_ms);
        let before = self.patterns.len();
        self.patterns.retain(|key, pattern| {
            has_entry(key.as_str()) || now.saturating_duration_since(pattern.last_access) <= stale_after
        });
        before - self.patterns.len()
    }

    /// Mean consistency over keys with enough samples to classify; 0 when none qualify.
    pub fn prediction_accuracy(&self) -> f64 {
        let min_samples = self.config.min_classification_samples;
        mean(
            self.patterns
                .values()
                .filter(|p| p.sample_count() >= min_samples)
                .map(AccessPattern::consistency),
        )
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn clear(&mut self) {
        self.patterns.clear();
    }
}
