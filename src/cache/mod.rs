//! Cache Module
//!
//! Namespaced in-memory caching with TTL expiration and LRU eviction.

mod entry;
mod key;
mod manager;
mod namespace;
mod stats;
mod store;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry};
pub use key::{cache_key, params_hash};
pub use manager::Cache;
pub use namespace::{default_policies, Namespace, NamespacePolicy};
pub use stats::CacheStats;
pub use store::{CacheStore, MEMORY_SAMPLE_SIZE};
