//! Cache Statistics Module
//!
//! Tracks per-namespace performance metrics including hits, misses, and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Per-namespace performance metrics.
///
/// Counters only ever grow until the namespace is reset. `size`, `max_size`
/// and `memory_estimate_mb` are filled in when a snapshot is taken.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Number of successful lookups
    pub hits: u64,
    /// Number of failed lookups (absent or expired)
    pub misses: u64,
    /// Entries removed by the LRU policy
    pub evictions: u64,
    /// Entries removed because their TTL elapsed
    pub expirations: u64,
    /// hits / (hits + misses), or 0.0 before any lookup
    pub hit_rate: f64,
    /// Current number of entries
    pub size: usize,
    /// Configured entry bound
    pub max_size: usize,
    /// Sampled memory estimate in megabytes. Approximate, may undercount.
    #[serde(rename = "memoryEstimateMB")]
    pub memory_estimate_mb: f64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            ..Self::default()
        }
    }

    // == Record Hit ==
    pub fn record_hit(&mut self) {
        self.hits += 1;
        self.refresh_hit_rate();
    }

    // == Record Miss ==
    pub fn record_miss(&mut self) {
        self.misses += 1;
        self.refresh_hit_rate();
    }

    // == Record Eviction ==
    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    // == Record Expiration ==
    pub fn record_expiration(&mut self) {
        self.expirations += 1;
    }

    fn refresh_hit_rate(&mut self) {
        let total = self.hits + self.misses;
        self.hit_rate = if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        };
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new(25);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.size, 0);
        assert_eq!(stats.max_size, 25);
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[test]
    fn test_hit_rate_all_hits() {
        let mut stats = CacheStats::new(1);
        stats.record_hit();
        stats.record_hit();
        assert_eq!(stats.hit_rate, 1.0);
    }

    #[test]
    fn test_hit_rate_one_miss_four_hits() {
        let mut stats = CacheStats::new(1);
        stats.record_miss();
        for _ in 0..4 {
            stats.record_hit();
        }
        assert!((stats.hit_rate - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_hit_rate_all_misses() {
        let mut stats = CacheStats::new(1);
        stats.record_miss();
        stats.record_miss();
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[test]
    fn test_record_eviction_and_expiration() {
        let mut stats = CacheStats::new(1);
        stats.record_eviction();
        stats.record_eviction();
        stats.record_expiration();
        assert_eq!(stats.evictions, 2);
        assert_eq!(stats.expirations, 1);
    }

    #[test]
    fn test_serialized_field_names() {
        let json = serde_json::to_value(CacheStats::new(3)).unwrap();
        assert!(json.get("hitRate").is_some());
        assert!(json.get("maxSize").is_some());
        assert!(json.get("memoryEstimateMB").is_some());
    }
}
