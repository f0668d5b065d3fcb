//! Adaptive cache.
//!
//! This module contains the core cache data structures and algorithms:
//! - [`entry`]: CacheEntry and stored payload types
//! - [`pattern`]: Per-key access pattern tracking and classification
//! - [`ttl`]: Adaptive TTL calculation
//! - [`evictor`]: Eviction policy (age + recency + popularity score)
//! - [`prefetcher`]: Predictive prefetch scheduling
//! - [`compressor`]: zstd compression of large values
//! - [`value`]: Value encoding trait
//! - [`stats`]: Hit/miss accounting and snapshots
//! - [`store`]: Synchronous core tying the above together
//! - [`adaptive`]: Thread-safe handle with background tasks

pub mod adaptive;
pub mod compressor;
pub mod entry;
pub mod evictor;
pub mod pattern;
pub mod prefetcher;
pub mod stats;
pub mod store;
pub mod ttl;
pub mod value;

pub use adaptive::{AdaptiveCache, Refresher, SharedCore};
pub use pattern::{Pattern, Trend};
pub use stats::StatsSnapshot;
pub use store::{CacheCore, MaintenanceReport, SetOptions};
pub use value::{CacheValue, CodecError, Json};
