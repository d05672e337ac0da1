//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and access tracking.

use chrono::Utc;

// == Cache Entry ==
/// A single cached value with its lifetime metadata.
///
/// All timestamps are Unix milliseconds.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Key the entry is stored under
    pub key: String,
    /// The stored value
    pub value: V,
    /// Creation timestamp
    pub created_at: u64,
    /// Expiration timestamp
    pub expires_at: u64,
    /// Last time the entry was read or written
    pub last_accessed_at: u64,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new entry that expires `ttl_ms` after `now`.
    pub fn new(key: String, value: V, now: u64, ttl_ms: u64) -> Self {
        Self {
            key,
            value,
            created_at: now,
            expires_at: now.saturating_add(ttl_ms),
            last_accessed_at: now,
        }
    }

    // == Is Expired ==
    /// An entry is expired once `now >= expires_at`.
    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    // == Touch ==
    /// Records an access at `now`.
    pub fn touch(&mut self, now: u64) {
        self.last_accessed_at = now;
    }

    /// Remaining lifetime in milliseconds, zero once expired.
    pub fn ttl_remaining_ms(&self) -> u64 {
        self.expires_at.saturating_sub(current_timestamp_ms())
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
