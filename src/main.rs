//! cachewatch - namespaced in-memory caching with file-driven invalidation
//!
//! Runs the cache alongside the checksum tracker for the current project
//! directory and reports statistics on shutdown.

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cachewatch::{spawn_sweep_task, wire_invalidation, Cache, CacheConfig, ChecksumTracker};

/// Main entry point for the cachewatch daemon.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from a JSON file (first argument) or environment variables
/// 3. Create the cache and the checksum tracker
/// 4. Wire file invalidation rules for the current directory
/// 5. Start the watch loop and the expired-entry sweep
/// 6. Stop watching on SIGINT/SIGTERM and log final statistics
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cachewatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cachewatch");

    let config = match std::env::args().nth(1) {
        Some(path) => CacheConfig::from_file(&path)
            .with_context(|| format!("failed to load configuration from {}", path))?,
        None => CacheConfig::from_env(),
    };
    info!(
        enabled = config.enabled,
        namespaces = config.namespaces.len(),
        watch_interval_ms = config.checksum_tracking.watch_interval_ms,
        algorithm = %config.checksum_tracking.algorithm,
        "Configuration loaded"
    );

    let cache = Cache::new(&config).context("invalid cache configuration")?;
    let tracker = ChecksumTracker::from_config(&config.checksum_tracking);

    if config.checksum_tracking.enabled {
        let root = std::env::current_dir().context("cannot determine working directory")?;
        wire_invalidation(&cache, &tracker, &root).await;
        tracker.start_watching(config.watch_interval());
    } else {
        info!("Checksum tracking disabled");
    }

    let sweep_handle = spawn_sweep_task(cache.clone(), config.sweep_interval());

    shutdown_signal().await;

    tracker.stop_watching();
    sweep_handle.abort();
    warn!("Sweep task aborted");

    for (namespace, stats) in cache.get_all_stats() {
        info!(
            namespace = %namespace,
            hits = stats.hits,
            misses = stats.misses,
            hit_rate = stats.hit_rate,
            size = stats.size,
            memory_estimate_mb = stats.memory_estimate_mb,
            "Final cache statistics"
        );
    }
    info!(tracker = ?tracker.stats(), "Shutdown complete");

    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
