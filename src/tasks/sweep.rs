//! Expired-entry Sweep Task
//!
//! Background task that periodically removes expired cache entries and
//! reports the sampled memory estimate against the advisory ceiling.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::Cache;

/// Spawns a background task that sweeps expired entries every `interval`.
///
/// Lazy expiry on read already keeps stale values from being served; the
/// sweep only releases memory held by entries nobody reads any more.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let cache = Cache::new(&CacheConfig::default())?;
/// let sweep_handle = spawn_sweep_task(cache.clone(), Duration::from_secs(30));
/// // Later, during shutdown:
/// sweep_handle.abort();
/// ```
pub fn spawn_sweep_task(cache: Cache, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_ms = interval.as_millis() as u64, "starting expired-entry sweep task");

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.purge_expired();
            if removed > 0 {
                info!(removed, "sweep removed expired entries");
            } else {
                debug!("sweep found no expired entries");
            }

            let estimate_mb = cache.total_memory_estimate_mb();
            let ceiling_mb = cache.max_memory_mb();
            if ceiling_mb > 0 && estimate_mb > ceiling_mb as f64 {
                warn!(estimate_mb, ceiling_mb, "estimated cache memory is above the advisory ceiling");
            }
        }
    })
}
