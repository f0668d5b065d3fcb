//! Adaptive TTL calculation.
//!
//! Starts from the configured default and scales it by recompute cost, the
//! key's detected access pattern and the popularity of the entry it replaces.
//! The result is always clamped to the configured bounds.

use std::time::Duration;

use tokio::time::Instant;

use crate::cache::pattern::Pattern;
use crate::config::{Config, TtlConfig};

/// Everything the calculator looks at for one `set`.
#[derive(Debug, Clone, Copy)]
pub struct TtlInputs {
    pub compute_cost: Duration,
    pub pattern: Pattern,
    pub predicted_next_access: Option<Instant>,
    /// Popularity of the entry being replaced, if any.
    pub existing_popularity: Option<f64>,
}

pub struct TtlCalculator {
    config: TtlConfig,
    default_ttl: Duration,
    min_ttl: Duration,
    max_ttl: Duration,
    adaptive: bool,
}

impl TtlCalculator {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.ttl.clone(),
            default_ttl: config.default_ttl(),
            min_ttl: config.min_ttl(),
            max_ttl: config.max_ttl(),
            adaptive: config.adaptive_ttl,
        }
    }

    /// Compute the TTL for a new or replaced entry.
    ///
    /// ```text
    /// ttl = default
    ///     × min(max_cost_multiplier, 1 + cost/divisor)   if cost > expensive_cost
    ///     × 2 (stable) | × 0.5 (volatile)
    ///     = max(min_ttl, predicted − now)                 if periodic with a prediction
    ///     × 1.5                                           if replacing a popular entry
    /// ```
    pub fn compute(&self, inputs: &TtlInputs, now: Instant) -> Duration {
        if !self.adaptive {
            return self.clamp(self.default_ttl);
        }

        let mut ttl_ms = millis(self.default_ttl);

        let cost_ms = millis(inputs.compute_cost);
        if cost_ms > self.config.expensive_cost_ms as f64 {
            let multiplier = (1.0 + cost_ms / self.config.cost_divisor_ms.max(f64::EPSILON))
                .min(self.config.max_cost_multiplier);
            ttl_ms *= multiplier;
        }

        match (inputs.pattern, inputs.predicted_next_access) {
            (Pattern::Stable, _) => ttl_ms *= self.config.stable_multiplier,
            (Pattern::Volatile, _) => ttl_ms *= self.config.volatile_multiplier,
            (Pattern::Periodic, Some(predicted)) => {
                let until_next = predicted.saturating_duration_since(now);
                ttl_ms = millis(until_next.max(self.min_ttl));
            }
            (Pattern::Periodic, None) | (Pattern::Unknown, _) => {}
        }

        if inputs
            .existing_popularity
            .is_some_and(|p| p > self.config.popularity_threshold)
        {
            ttl_ms *= self.config.popularity_multiplier;
        }

        let bounded = ttl_ms.clamp(millis(self.min_ttl), millis(self.max_ttl));
        self.clamp(Duration::from_millis(bounded.round() as u64))
    }

    /// Clamp a duration to `[min_ttl, max_ttl]`.
    pub fn clamp(&self, ttl: Duration) -> Duration {
        ttl.clamp(self.min_ttl, self.max_ttl)
    }
}

fn millis(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}
