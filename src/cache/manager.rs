//! Multi-namespace cache
//!
//! [`Cache`] is the handle consumers hold. It owns one [`CacheStore`] per
//! configured namespace and never surfaces an error through its read/write
//! path: problems are logged and the call degrades to a miss or a no-op.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, CacheStore};
use crate::config::CacheConfig;
use crate::error::Result;

// == Cache ==
/// Cloneable handle to the process-wide cache.
///
/// Values are stored in their JSON form, so one namespace can hold any
/// serializable payload and readers choose the type they decode into.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    /// Global kill switch
    enabled: bool,
    /// Advisory ceiling, reported but never enforced
    max_memory_mb: u64,
    /// One store per configured namespace
    namespaces: HashMap<String, Mutex<CacheStore<Value>>>,
    /// Unknown namespace names already warned about
    reported_unknown: Mutex<HashSet<String>>,
}

impl Cache {
    // == Constructor ==
    /// Builds a cache from a validated configuration.
    pub fn new(config: &CacheConfig) -> Result<Self> {
        config.validate()?;

        let namespaces: HashMap<_, _> = config
            .namespaces
            .iter()
            .map(|(name, policy)| (name.clone(), Mutex::new(CacheStore::new(name.clone(), *policy))))
            .collect();

        info!(
            enabled = config.enabled,
            namespaces = namespaces.len(),
            max_memory_mb = config.max_memory_mb,
            "cache initialized"
        );

        Ok(Self {
            inner: Arc::new(CacheInner {
                enabled: config.enabled,
                max_memory_mb: config.max_memory_mb,
                namespaces,
                reported_unknown: Mutex::new(HashSet::new()),
            }),
        })
    }

    // == Get ==
    /// Looks up `key` in `namespace`.
    ///
    /// Returns `None` on a miss, on an expired entry, for an unknown
    /// namespace, or when the cache is disabled. A stored value that no
    /// longer decodes as `T` is discarded and counted as a miss.
    pub fn get<T: DeserializeOwned>(&self, namespace: impl AsRef<str>, key: &str) -> Option<T> {
        if !self.inner.enabled {
            return None;
        }
        let namespace = namespace.as_ref();

        self.with_store(namespace, |store| {
            store.get_decoded(key, |value: &Value| T::deserialize(value))
        })
        .flatten()
    }

    // == Set ==
    /// Stores `value` under `key` in `namespace`.
    ///
    /// A no-op when the cache is disabled, the namespace is unknown, or the
    /// value cannot be serialized.
    pub fn set<T: Serialize>(&self, namespace: impl AsRef<str>, key: impl Into<String>, value: T) {
        if !self.inner.enabled {
            return;
        }
        let namespace = namespace.as_ref();
        let key = key.into();

        if !self.inner.namespaces.contains_key(namespace) {
            self.report_unknown(namespace);
            return;
        }

        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                warn!(namespace, key = %key, error = %err, "value is not serializable, not caching");
                return;
            }
        };

        self.with_store(namespace, |store| store.set(key, value));
    }

    /// Returns the cached value or computes, stores and returns it.
    pub fn get_or_insert_with<T, F>(&self, namespace: impl AsRef<str>, key: &str, compute: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let namespace = namespace.as_ref();
        if let Some(hit) = self.get(namespace, key) {
            return hit;
        }
        let value = compute();
        self.set(namespace, key, &value);
        value
    }

    // == Invalidate ==
    /// Removes `key` from `namespace`, or clears the namespace when `key` is
    /// `None`. Returns the number of entries removed.
    pub fn invalidate(&self, namespace: impl AsRef<str>, key: Option<&str>) -> usize {
        let namespace = namespace.as_ref();
        let removed = self
            .with_store(namespace, |store| store.invalidate(key))
            .unwrap_or(0);

        debug!(namespace, key = ?key, removed, "invalidated");
        removed
    }

    // == Purge Expired ==
    /// Sweeps expired entries out of every namespace.
    pub fn purge_expired(&self) -> usize {
        self.inner
            .namespaces
            .values()
            .map(|store| store.lock().purge_expired())
            .sum()
    }

    // == Stats ==
    /// Statistics for one namespace, `None` if it is not configured.
    pub fn get_stats(&self, namespace: impl AsRef<str>) -> Option<CacheStats> {
        self.with_store(namespace.as_ref(), |store| store.stats())
    }

    /// Statistics for every configured namespace, keyed by name.
    pub fn get_all_stats(&self) -> BTreeMap<String, CacheStats> {
        self.inner
            .namespaces
            .iter()
            .map(|(name, store)| (name.clone(), store.lock().stats()))
            .collect()
    }

    /// Sum of the per-namespace memory estimates.
    pub fn total_memory_estimate_mb(&self) -> f64 {
        self.inner
            .namespaces
            .values()
            .map(|store| store.lock().memory_estimate_mb())
            .sum()
    }

    // == Reset ==
    /// Discards every entry and counter. Meant for test isolation.
    pub fn reset(&self) {
        for store in self.inner.namespaces.values() {
            store.lock().reset();
        }
        self.inner.reported_unknown.lock().clear();
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled
    }

    pub fn max_memory_mb(&self) -> u64 {
        self.inner.max_memory_mb
    }

    /// Configured namespace names in sorted order.
    pub fn namespace_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.namespaces.keys().cloned().collect();
        names.sort();
        names
    }

    fn with_store<R>(&self, namespace: &str, f: impl FnOnce(&mut CacheStore<Value>) -> R) -> Option<R> {
        match self.inner.namespaces.get(namespace) {
            Some(store) => Some(f(&mut store.lock())),
            None => {
                self.report_unknown(namespace);
                None
            }
        }
    }

    fn report_unknown(&self, namespace: &str) {
        if self.inner.reported_unknown.lock().insert(namespace.to_string()) {
            warn!(namespace, "unknown cache namespace, calls to it are ignored");
        }
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("enabled", &self.inner.enabled)
            .field("namespaces", &self.namespace_names())
            .finish_non_exhaustive()
    }
}
