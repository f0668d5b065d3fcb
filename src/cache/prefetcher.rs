//! Predictive prefetching: marks keys due for refresh shortly before their
//! predicted next read.
//!
//! The scheduler only tracks *when* a key becomes due. Refreshing the value is
//! up to the caller, who owns the value factory.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::config::PrefetchConfig;

/// A pending prefetch: mark `key` due at `fire_at`.
#[derive(Debug, Clone)]
pub struct PrefetchRequest {
    pub key: String,
    pub fire_at: Instant,
    pub predicted_at: Instant,
}

#[derive(Debug, Default, Clone)]
pub struct PrefetchStats {
    pub total_scheduled: u64,
    pub total_due: u64,
    pub total_cancelled: u64,
    /// Predictions outside the scheduling window.
    pub total_skipped: u64,
}

/// Time-ordered queue of prefetch requests.
pub struct PrefetchScheduler {
    config: PrefetchConfig,

    /// Pending requests ordered by `fire_at` (earliest first).
    queue: VecDeque<PrefetchRequest>,

    stats: PrefetchStats,
}

impl PrefetchScheduler {
    pub fn new(config: PrefetchConfig) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
            stats: PrefetchStats::default(),
        }
    }

    /// Schedule `key` if its predicted access is neither too close nor too far.
    ///
    /// Any earlier request for the key is replaced. Returns whether a request
    /// is now pending.
    pub fn schedule(&mut self, key: &str, predicted_at: Instant, now: Instant) -> bool {
        // The newest prediction wins, even when it is not schedulable.
        self.remove_key(key);

        let horizon = predicted_at.saturating_duration_since(now);
        let min = Duration::from_millis(self.config.min_horizon_ms);
        let max = Duration::from_millis(self.config.max_horizon_ms);

        if horizon <= min || horizon >= max {
            self.stats.total_skipped += 1;
            return false;
        }

        let fire_at = predicted_at - Duration::from_millis(self.config.lead_time_ms).min(horizon);
        let pos = self
            .queue
            .iter()
            .position(|existing| existing.fire_at > fire_at)
            .unwrap_or(self.queue.len());

        debug!(
            key,
            fire_in_ms = fire_at.saturating_duration_since(now).as_millis() as u64,
            "Scheduled prefetch"
        );

        self.queue.insert(
            pos,
            PrefetchRequest {
                key: key.to_string(),
                fire_at,
                predicted_at,
            },
        );
        self.stats.total_scheduled += 1;
        true
    }

    /// Pop every request whose fire time has been reached.
    pub fn drain_due(&mut self, now: Instant) -> Vec<String> {
        let mut due = Vec::new();
        while self.queue.front().is_some_and(|req| req.fire_at <= now) {
            if let Some(req) = self.queue.pop_front() {
                due.push(req.key);
            }
        }
        self.stats.total_due += due.len() as u64;
        due
    }

    /// Cancel the pending request for a key.
    pub fn cancel(&mut self, key: &str) -> bool {
        let removed = self.remove_key(key);
        if removed {
            self.stats.total_cancelled += 1;
        }
        removed
    }

    /// Cancel pending requests for every key the predicate accepts.
    /// Returns the cancelled keys.
    pub fn cancel_matching(&mut self, predicate: impl Fn(&str) -> bool) -> Vec<String> {
        let (cancelled, kept): (VecDeque<_>, VecDeque<_>) = self
            .queue
            .drain(..)
            .partition(|req| predicate(req.key.as_str()));
        self.queue = kept;
        self.stats.total_cancelled += cancelled.len() as u64;
        cancelled.into_iter().map(|req| req.key).collect()
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.queue.iter().any(|req| req.key == key)
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> &PrefetchStats {
        &self.stats
    }

    /// Drop all pending requests and reset statistics.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.stats = PrefetchStats::default();
    }

    fn remove_key(&mut self, key: &str) -> bool {
        let before = self.queue.len();
        self.queue.retain(|req| req.key != key);
        before != self.queue.len()
    }
}
