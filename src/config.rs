//! Configuration Module
//!
//! Loads the cache configuration from JSON or environment variables.

use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{default_policies, NamespacePolicy};
use crate::checksum::{ChecksumAlgorithm, DEFAULT_MAX_HASH_BYTES};
use crate::error::{CacheError, Result};

/// Cache configuration.
///
/// Field names follow the JSON shape, e.g.
/// `{"enabled": true, "maxMemoryMB": 100, "namespaces": {"git": {"max": 50, "ttl": 30000}}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    /// Global kill switch: when false every lookup misses and every store is dropped
    pub enabled: bool,
    /// Advisory memory ceiling, surfaced in logs but never enforced
    #[serde(rename = "maxMemoryMB")]
    pub max_memory_mb: u64,
    /// Per-namespace size and TTL
    pub namespaces: BTreeMap<String, NamespacePolicy>,
    /// File change detection settings
    pub checksum_tracking: ChecksumTrackingConfig,
    /// Interval of the background expired-entry sweep, in milliseconds
    pub sweep_interval_ms: u64,
}

/// Settings for the checksum tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChecksumTrackingConfig {
    pub enabled: bool,
    /// Polling interval in milliseconds
    pub watch_interval_ms: u64,
    pub algorithm: ChecksumAlgorithm,
    /// Files larger than this are compared by mtime and size only
    pub max_hash_bytes: u64,
}

impl CacheConfig {
    /// Creates a configuration from defaults overlaid with environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_ENABLED` - Global kill switch (default: true)
    /// - `CACHE_MAX_MEMORY_MB` - Advisory memory ceiling (default: 100)
    /// - `CACHE_CHECKSUM_TRACKING` - Enable file watching (default: true)
    /// - `CACHE_WATCH_INTERVAL_MS` - Watch interval (default: 5000)
    /// - `CACHE_CHECKSUM_ALGORITHM` - `sha256` or `md5` (default: sha256)
    /// - `CACHE_SWEEP_INTERVAL_MS` - Expired-entry sweep interval (default: 30000)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`CacheConfig::from_env`] with a custom variable source.
    ///
    /// Unparsable values fall back to the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(
            lookup: &dyn Fn(&str) -> Option<String>,
            name: &str,
            default: T,
        ) -> T {
            lookup(name)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        }

        let defaults = Self::default();
        let tracking = defaults.checksum_tracking.clone();
        Self {
            enabled: parsed(&lookup, "CACHE_ENABLED", defaults.enabled),
            max_memory_mb: parsed(&lookup, "CACHE_MAX_MEMORY_MB", defaults.max_memory_mb),
            sweep_interval_ms: parsed(&lookup, "CACHE_SWEEP_INTERVAL_MS", defaults.sweep_interval_ms),
            checksum_tracking: ChecksumTrackingConfig {
                enabled: parsed(&lookup, "CACHE_CHECKSUM_TRACKING", tracking.enabled),
                watch_interval_ms: parsed(&lookup, "CACHE_WATCH_INTERVAL_MS", tracking.watch_interval_ms),
                algorithm: parsed(&lookup, "CACHE_CHECKSUM_ALGORITHM", tracking.algorithm),
                max_hash_bytes: tracking.max_hash_bytes,
            },
            namespaces: defaults.namespaces,
        }
    }

    /// Parses a JSON configuration, filling unspecified namespaces with defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(json)?;
        config.fill_default_namespaces();
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| CacheError::io(path, e))?;
        Self::from_json_str(&raw)
    }

    /// Adds the default policy for every well-known namespace not already present.
    pub fn fill_default_namespaces(&mut self) {
        for (name, policy) in default_policies() {
            self.namespaces.entry(name).or_insert(policy);
        }
    }

    /// Rejects zero-sized namespaces, zero TTLs and zero intervals.
    pub fn validate(&self) -> Result<()> {
        for (name, policy) in &self.namespaces {
            policy.validate(name)?;
        }
        if self.checksum_tracking.watch_interval_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "checksumTracking.watchIntervalMs must be greater than zero".to_string(),
            ));
        }
        if self.sweep_interval_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "sweepIntervalMs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.checksum_tracking.watch_interval_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_memory_mb: 100,
            namespaces: default_policies(),
            checksum_tracking: ChecksumTrackingConfig::default(),
            sweep_interval_ms: 30_000,
        }
    }
}

impl Default for ChecksumTrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            watch_interval_ms: 5_000,
            algorithm: ChecksumAlgorithm::Sha256,
            max_hash_bytes: DEFAULT_MAX_HASH_BYTES,
        }
    }
}
