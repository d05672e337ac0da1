//! Cache Store Module
//!
//! Per-namespace storage combining an ordered LRU map with TTL expiration.

use std::convert::Infallible;
use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{CacheEntry, CacheStats, NamespacePolicy};

/// Number of entries sampled by the memory estimate.
pub const MEMORY_SAMPLE_SIZE: usize = 10;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

// == Cache Store ==
/// Bounded key/entry map for a single namespace.
///
/// Recency order of the underlying [`LruCache`] is the eviction order, so
/// lookups, promotion and eviction are all O(1).
#[derive(Debug)]
pub struct CacheStore<V> {
    /// Namespace name, used in log output
    name: String,
    /// Entries ordered from most to least recently used
    entries: LruCache<String, CacheEntry<V>>,
    /// Performance statistics
    stats: CacheStats,
    /// Size bound and TTL
    policy: NamespacePolicy,
}

impl<V> CacheStore<V>
where
    V: Clone + Serialize,
{
    // == Constructor ==
    /// Creates an empty store governed by `policy`.
    ///
    /// A zero `max` is clamped to one entry; [`NamespacePolicy::validate`]
    /// rejects it before a store is ever built from configuration.
    pub fn new(name: impl Into<String>, policy: NamespacePolicy) -> Self {
        let max = NonZeroUsize::new(policy.max).unwrap_or(NonZeroUsize::MIN);
        let policy = NamespacePolicy::new(max.get(), policy.ttl);
        Self {
            name: name.into(),
            entries: LruCache::unbounded(),
            stats: CacheStats::new(policy.max),
            policy,
        }
    }

    // == Get ==
    /// Returns a clone of the value stored under `key`.
    ///
    /// Absent and expired entries count as misses; an expired entry is
    /// dropped on the spot. A hit moves the entry to most-recently-used.
    pub fn get(&mut self, key: &str) -> Option<V> {
        self.get_decoded(key, |value| Ok::<V, Infallible>(value.clone()))
    }

    /// Like [`get`](Self::get), converting the stored value with `decode`.
    ///
    /// An entry that fails to decode is removed and counted as a miss.
    pub fn get_decoded<R, E: fmt::Display>(
        &mut self,
        key: &str,
        decode: impl FnOnce(&V) -> Result<R, E>,
    ) -> Option<R> {
        let now = current_timestamp_ms();

        let expired = match self.entries.peek(key) {
            Some(entry) => entry.is_expired_at(now),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.entries.pop(key);
            self.stats.record_expiration();
            self.stats.record_miss();
            debug!(namespace = %self.name, key, "expired entry removed on read");
            return None;
        }

        // get_mut promotes the entry to the front of the recency list
        let entry = self.entries.get_mut(key)?;
        match decode(&entry.value) {
            Ok(value) => {
                entry.touch(now);
                self.stats.record_hit();
                Some(value)
            }
            Err(err) => {
                warn!(namespace = %self.name, key, error = %err, "cached value has an unexpected shape, discarding");
                self.entries.pop(key);
                self.stats.record_miss();
                None
            }
        }
    }

    // == Set ==
    /// Stores `value` under `key`, resetting its TTL.
    ///
    /// Overwrites move the key to most-recently-used. A new key inserted into a
    /// full store first evicts the least recently used entry.
    pub fn set(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        let now = current_timestamp_ms();

        if !self.entries.contains(&key) && self.entries.len() >= self.policy.max {
            if let Some((evicted, _)) = self.entries.pop_lru() {
                self.stats.record_eviction();
                debug!(namespace = %self.name, key = %evicted, "evicted least recently used entry");
            }
        }

        let entry = CacheEntry::new(key.clone(), value, now, self.policy.ttl);
        self.entries.put(key, entry);
    }

    // == Invalidate ==
    /// Removes one entry, or every entry when `key` is `None`.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate(&mut self, key: Option<&str>) -> usize {
        match key {
            Some(key) => usize::from(self.entries.pop(key).is_some()),
            None => {
                let removed = self.entries.len();
                self.entries.clear();
                removed
            }
        }
    }

    // == Purge Expired ==
    /// Removes all expired entries.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = current_timestamp_ms();
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.entries.pop(key);
            self.stats.record_expiration();
        }

        expired_keys.len()
    }

    // == Stats ==
    /// Returns a snapshot of the namespace statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.size = self.entries.len();
        stats.max_size = self.policy.max;
        stats.memory_estimate_mb = self.memory_estimate_mb();
        stats
    }

    // == Memory Estimate ==
    /// Approximates the namespace footprint in megabytes.
    ///
    /// Serializes up to [`MEMORY_SAMPLE_SIZE`] of the most recently used
    /// values, averages their encoded size and scales by the entry count.
    /// Allocator overhead and map bookkeeping are not counted, so the figure
    /// can undercount real usage by a wide margin. Never use it to enforce a
    /// limit.
    pub fn memory_estimate_mb(&self) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }

        let sampled: Vec<usize> = self
            .entries
            .iter()
            .take(MEMORY_SAMPLE_SIZE)
            .map(|(key, entry)| {
                key.len() + serde_json::to_vec(&entry.value).map_or(0, |bytes| bytes.len())
            })
            .collect();

        let average = sampled.iter().sum::<usize>() as f64 / sampled.len() as f64;
        average * self.entries.len() as f64 / BYTES_PER_MB
    }

    // == Reset ==
    /// Drops every entry and zeroes the counters.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.stats = CacheStats::new(self.policy.max);
    }

    /// Peeks at an entry without touching recency or statistics.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.peek(key)
    }

    pub fn policy(&self) -> NamespacePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    fn store(max: usize, ttl_ms: u64) -> CacheStore<String> {
        CacheStore::new("test", NamespacePolicy::new(max, ttl_ms))
    }

    #[test]
    fn test_store_new() {
        let store = store(100, 60_000);
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.stats().max_size, 100);
    }

    #[test]
    fn test_store_set_and_get() {
        let mut store = store(100, 60_000);

        store.set("key1", "value1".to_string());

        assert_eq!(store.get("key1").as_deref(), Some("value1"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent_records_miss() {
        let mut store = store(100, 60_000);

        assert!(store.get("nonexistent").is_none());
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_store_undecodable_entry_counts_as_miss() {
        let mut store = store(100, 60_000);
        store.set("port", "not a port".to_string());

        let port = store.get_decoded("port", |value| value.parse::<u16>());

        assert_eq!(port, None);
        assert_eq!(store.len(), 0);
        assert_eq!(store.stats().hits, 0);
        assert_eq!(store.stats().misses, 1);

        store.set("port", "8080".to_string());
        assert_eq!(store.get_decoded("port", |value| value.parse::<u16>()), Some(8080));
        assert_eq!(store.stats().hits, 1);
    }

    #[test]
    fn test_store_overwrite() {
        let mut store = store(100, 60_000);

        store.set("key1", "value1".to_string());
        store.set("key1", "value2".to_string());

        assert_eq!(store.get("key1").as_deref(), Some("value2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_ttl_expiration() {
        let mut store = store(100, 100);

        store.set("key1", "value1".to_string());
        assert_eq!(store.get("key1").as_deref(), Some("value1"));

        sleep(Duration::from_millis(150));

        assert!(store.get("key1").is_none());
        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.expirations, 1);
        assert!(store.is_empty(), "expired entry should be dropped on read");
    }

    #[test]
    fn test_store_lru_eviction() {
        let mut store = store(3, 60_000);

        store.set("key1", "value1".to_string());
        store.set("key2", "value2".to_string());
        store.set("key3", "value3".to_string());
        store.set("key4", "value4".to_string());

        assert_eq!(store.len(), 3);
        assert!(store.get("key1").is_none());
        assert!(store.get("key2").is_some());
        assert!(store.get("key3").is_some());
        assert!(store.get("key4").is_some());
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_store_lru_read_protects_oldest_key() {
        let n = 4;
        let mut store = store(n, 60_000);

        for i in 1..n {
            store.set(format!("key{}", i), format!("value{}", i));
        }
        // key1 read after keys 2..N-1 went in
        assert!(store.get("key1").is_some());
        store.set(format!("key{}", n), "valueN".to_string());
        store.set(format!("key{}", n + 1), "valueN1".to_string());

        assert_eq!(store.len(), n);
        assert!(store.peek("key1").is_some());
        assert!(store.peek("key2").is_none());
    }

    #[test]
    fn test_store_overwrite_refreshes_recency() {
        let mut store = store(2, 60_000);

        store.set("a", "1".to_string());
        store.set("b", "2".to_string());
        store.set("a", "3".to_string());
        store.set("c", "4".to_string());

        assert!(store.peek("a").is_some());
        assert!(store.peek("b").is_none());
    }

    #[test]
    fn test_store_miss_does_not_refresh_recency() {
        let mut store = store(2, 60_000);

        store.set("a", "1".to_string());
        store.set("b", "2".to_string());
        assert!(store.get("zzz").is_none());
        store.set("c", "3".to_string());

        assert!(store.peek("a").is_none());
        assert!(store.peek("b").is_some());
    }

    #[test]
    fn test_store_get_bumps_last_accessed_at() {
        let mut store = store(10, 60_000);

        store.set("a", "1".to_string());
        let before = store.peek("a").unwrap().last_accessed_at;
        sleep(Duration::from_millis(5));
        store.get("a");

        assert!(store.peek("a").unwrap().last_accessed_at > before);
    }

    #[test]
    fn test_store_invalidate_single_key() {
        let mut store = store(10, 60_000);

        store.set("a", "1".to_string());
        store.set("b", "2".to_string());

        assert_eq!(store.invalidate(Some("a")), 1);
        assert_eq!(store.invalidate(Some("a")), 0);
        assert!(store.get("a").is_none());
        assert!(store.get("b").is_some());
    }

    #[test]
    fn test_store_invalidate_everything() {
        let mut store = store(10, 60_000);

        store.set("a", "1".to_string());
        store.set("b", "2".to_string());

        assert_eq!(store.invalidate(None), 2);
        assert!(store.is_empty());
        assert!(store.get("a").is_none());
        assert!(store.get("b").is_none());
    }

    #[test]
    fn test_store_purge_expired() {
        let mut store = store(10, 50);

        store.set("a", "1".to_string());
        sleep(Duration::from_millis(80));
        store.set("b", "2".to_string());

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("b").is_some());
        // purging is not a lookup
        assert_eq!(store.stats().misses, 0);
    }

    #[test]
    fn test_store_hit_rate() {
        let mut store = store(10, 60_000);

        assert!(store.get("k").is_none());
        store.set("k", "v".to_string());
        for _ in 0..4 {
            assert!(store.get("k").is_some());
        }

        assert!((store.stats().hit_rate - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_store_memory_estimate() {
        let mut store = store(100, 60_000);
        assert_eq!(store.memory_estimate_mb(), 0.0);

        for i in 0..20 {
            store.set(format!("k{:02}", i), "x".repeat(1024));
        }

        // 20 entries of roughly 1 KiB each
        let estimate = store.stats().memory_estimate_mb;
        assert!(estimate > 0.015 && estimate < 0.025, "estimate was {}", estimate);
    }

    #[test]
    fn test_store_reset() {
        let mut store = store(10, 60_000);

        store.set("a", "1".to_string());
        store.get("a");
        store.reset();

        assert!(store.is_empty());
        assert_eq!(store.stats(), CacheStats::new(10));
    }

    #[test]
    fn test_store_zero_max_is_clamped() {
        let mut store = store(0, 60_000);

        store.set("a", "1".to_string());
        store.set("b", "2".to_string());

        assert_eq!(store.len(), 1);
        assert_eq!(store.policy().max, 1);
    }
}
