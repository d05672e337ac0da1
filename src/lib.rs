//! cachewatch - namespaced in-memory caching with file-driven invalidation
//!
//! Provides bounded, TTL-expiring cache namespaces with LRU eviction, and a
//! checksum tracker that clears namespaces when the files they depend on change.

pub mod cache;
pub mod checksum;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod tasks;

pub use cache::{cache_key, Cache, CacheStats, Namespace, NamespacePolicy};
pub use checksum::{ChangeCallback, ChecksumAlgorithm, ChecksumTracker, ScanOutcome, TrackOptions};
pub use config::{CacheConfig, ChecksumTrackingConfig};
pub use error::{CacheError, Result};
pub use invalidation::{wire_invalidation, wire_rules, InvalidationRule, DEFAULT_RULES};
pub use tasks::spawn_sweep_task;
