//! Checksum Tracker
//!
//! Polls tracked files and notifies callbacks when their content changes.
//!
//! Change detection has two tiers. The fast path re-stats the file and, when
//! mtime and size both match the stored baseline, reports "unchanged" without
//! reading any content. Otherwise the slow path hashes the file and compares
//! against the stored checksum. Files above the hashing ceiling are compared by
//! mtime and size alone.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::checksum::{ChangeCallback, ChecksumAlgorithm};
use crate::config::ChecksumTrackingConfig;

/// Files larger than this skip hashing unless configured otherwise.
pub const DEFAULT_MAX_HASH_BYTES: u64 = 10 * 1024 * 1024;

/// Per-path overrides for [`ChecksumTracker::track_with`].
///
/// Only honoured the first time a path is tracked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackOptions {
    pub algorithm: Option<ChecksumAlgorithm>,
    pub max_hash_bytes: Option<u64>,
}

/// Result of a [`ChecksumTracker::check_all`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Another scan was already in flight; nothing was checked
    Skipped,
    /// The scan ran; lists the paths whose callbacks fired
    Completed { changed: Vec<PathBuf> },
}

impl ScanOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, ScanOutcome::Skipped)
    }

    pub fn changed(&self) -> &[PathBuf] {
        match self {
            ScanOutcome::Skipped => &[],
            ScanOutcome::Completed { changed } => changed,
        }
    }
}

/// Tracker counters for operator visibility.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStats {
    pub tracked_files: usize,
    /// Number of file hashes computed, baseline captures included
    pub checksum_computations: u64,
    pub scans_completed: u64,
    pub scans_skipped: u64,
    pub watching: bool,
}

/// Last observed state of a tracked file.
///
/// When the file disappears `present` flips to false but the other fields
/// keep the last known values, so a file restored with the same content is
/// not reported as changed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Baseline {
    present: bool,
    mtime: Option<SystemTime>,
    size: u64,
    checksum: Option<String>,
}

impl Baseline {
    fn absent() -> Self {
        Self {
            present: false,
            mtime: None,
            size: 0,
            checksum: None,
        }
    }

    fn gone(&self) -> Self {
        Self {
            present: false,
            ..self.clone()
        }
    }
}

enum Observation {
    Absent,
    Present { mtime: Option<SystemTime>, size: u64 },
}

#[derive(Debug)]
struct TrackedFile {
    algorithm: ChecksumAlgorithm,
    max_hash_bytes: u64,
    baseline: Baseline,
    callbacks: Vec<ChangeCallback>,
}

// == Checksum Tracker ==
/// Cloneable handle to the file tracker.
///
/// Clones share the same tracked set, counters and watch loop.
#[derive(Clone)]
pub struct ChecksumTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    files: Mutex<HashMap<PathBuf, TrackedFile>>,
    algorithm: ChecksumAlgorithm,
    max_hash_bytes: u64,
    /// In-flight guard for check_all
    scanning: AtomicBool,
    watcher: Mutex<Option<JoinHandle<()>>>,
    checksum_computations: AtomicU64,
    scans_completed: AtomicU64,
    scans_skipped: AtomicU64,
}

impl Drop for TrackerInner {
    fn drop(&mut self) {
        if let Some(handle) = self.watcher.get_mut().take() {
            handle.abort();
        }
    }
}

impl ChecksumTracker {
    // == Constructor ==
    pub fn new(algorithm: ChecksumAlgorithm, max_hash_bytes: u64) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                files: Mutex::new(HashMap::new()),
                algorithm,
                max_hash_bytes,
                scanning: AtomicBool::new(false),
                watcher: Mutex::new(None),
                checksum_computations: AtomicU64::new(0),
                scans_completed: AtomicU64::new(0),
                scans_skipped: AtomicU64::new(0),
            }),
        }
    }

    pub fn from_config(config: &ChecksumTrackingConfig) -> Self {
        Self::new(config.algorithm, config.max_hash_bytes)
    }

    // == Track ==
    /// Registers `callback` for `path` using the tracker defaults.
    pub async fn track(&self, path: impl Into<PathBuf>, callback: ChangeCallback) {
        self.track_with(path, callback, TrackOptions::default()).await;
    }

    /// Registers `callback` for `path`.
    ///
    /// The first registration for a path captures its baseline before
    /// returning. Later registrations append to the callback list and keep
    /// the existing baseline. A path that does not exist yet is tracked as
    /// absent and fires once it appears.
    pub async fn track_with(&self, path: impl Into<PathBuf>, callback: ChangeCallback, options: TrackOptions) {
        let path = path.into();

        {
            let mut files = self.inner.files.lock();
            if let Some(file) = files.get_mut(&path) {
                file.callbacks.push(callback);
                debug!(path = %path.display(), callbacks = file.callbacks.len(), "added callback to tracked file");
                return;
            }
        }

        let algorithm = options.algorithm.unwrap_or(self.inner.algorithm);
        let max_hash_bytes = options.max_hash_bytes.unwrap_or(self.inner.max_hash_bytes);
        let baseline = self.capture_baseline(&path, algorithm, max_hash_bytes).await;
        debug!(
            path = %path.display(),
            present = baseline.present,
            hashed = baseline.checksum.is_some(),
            "tracking file"
        );

        // another task may have tracked the same path while we were hashing
        let mut files = self.inner.files.lock();
        files
            .entry(path)
            .or_insert_with(|| TrackedFile {
                algorithm,
                max_hash_bytes,
                baseline,
                callbacks: Vec::new(),
            })
            .callbacks
            .push(callback);
    }

    /// Stops tracking `path`. Returns whether it was tracked.
    pub fn untrack(&self, path: impl AsRef<Path>) -> bool {
        self.inner.files.lock().remove(path.as_ref()).is_some()
    }

    /// Tracked paths in sorted order.
    pub fn tracked_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.inner.files.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    // == Has Changed ==
    /// Checks one tracked file against its baseline and updates the baseline.
    ///
    /// A deleted file reports a change exactly once. Filesystem errors other
    /// than "not found" are treated as changes. Untracked paths report false.
    pub async fn has_changed(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let snapshot = {
            let files = self.inner.files.lock();
            files
                .get(path)
                .map(|file| (file.baseline.clone(), file.algorithm, file.max_hash_bytes))
        };
        let Some((baseline, algorithm, max_hash_bytes)) = snapshot else {
            debug!(path = %path.display(), "has_changed called for untracked path");
            return false;
        };

        let (changed, next) = self.evaluate(path, &baseline, algorithm, max_hash_bytes).await;

        if let Some(file) = self.inner.files.lock().get_mut(path) {
            file.baseline = next;
        }
        changed
    }

    // == Check All ==
    /// Checks every tracked file and fires the callbacks of changed ones.
    ///
    /// Callbacks for a path run in registration order; a failing or panicking
    /// callback is logged and the rest still run. If a previous scan is still
    /// in flight this call does nothing and returns [`ScanOutcome::Skipped`].
    pub async fn check_all(&self) -> ScanOutcome {
        let Some(_guard) = ScanGuard::acquire(&self.inner.scanning) else {
            self.inner.scans_skipped.fetch_add(1, Ordering::Relaxed);
            debug!("previous scan still running, skipping");
            return ScanOutcome::Skipped;
        };

        let mut changed = Vec::new();
        for path in self.tracked_paths() {
            if !self.has_changed(&path).await {
                continue;
            }

            let callbacks = self
                .inner
                .files
                .lock()
                .get(&path)
                .map(|file| file.callbacks.clone())
                .unwrap_or_default();
            info!(path = %path.display(), callbacks = callbacks.len(), "tracked file changed");

            for (index, callback) in callbacks.iter().enumerate() {
                if let Err(err) = callback.invoke(&path).await {
                    warn!(path = %path.display(), callback = index, error = %err, "change callback failed");
                }
            }
            changed.push(path);
        }

        self.inner.scans_completed.fetch_add(1, Ordering::Relaxed);
        ScanOutcome::Completed { changed }
    }

    // == Watching ==
    /// Runs [`check_all`](Self::check_all) every `interval` on a background task.
    ///
    /// Idempotent while a watch loop is running. Each tick launches its scan
    /// separately, so a tick that lands during a slow scan is dropped by the
    /// in-flight guard. The interval should stay above the typical scan
    /// duration.
    pub fn start_watching(&self, interval: Duration) {
        if interval.is_zero() {
            warn!("refusing to watch with a zero interval");
            return;
        }

        let mut watcher = self.inner.watcher.lock();
        if watcher.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("watch loop already running");
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        *watcher = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let tracker = ChecksumTracker { inner };
                tokio::spawn(async move {
                    tracker.check_all().await;
                });
            }
        }));

        info!(interval_ms = interval.as_millis() as u64, "started watching tracked files");
    }

    /// Stops the watch loop. A scan already in progress runs to completion.
    pub fn stop_watching(&self) {
        if let Some(handle) = self.inner.watcher.lock().take() {
            handle.abort();
            info!("stopped watching tracked files");
        }
    }

    pub fn is_watching(&self) -> bool {
        self.inner
            .watcher
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stops watching and forgets every tracked file.
    pub fn clear(&self) {
        self.stop_watching();
        self.inner.files.lock().clear();
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            tracked_files: self.inner.files.lock().len(),
            checksum_computations: self.inner.checksum_computations.load(Ordering::Relaxed),
            scans_completed: self.inner.scans_completed.load(Ordering::Relaxed),
            scans_skipped: self.inner.scans_skipped.load(Ordering::Relaxed),
            watching: self.is_watching(),
        }
    }

    async fn capture_baseline(&self, path: &Path, algorithm: ChecksumAlgorithm, max_hash_bytes: u64) -> Baseline {
        match observe(path).await {
            Observation::Absent => Baseline::absent(),
            Observation::Present { mtime, size } => {
                let checksum = if size > max_hash_bytes {
                    None
                } else {
                    self.checksum(path, algorithm).await.ok()
                };
                Baseline {
                    present: true,
                    mtime,
                    size,
                    checksum,
                }
            }
        }
    }

    /// Compares the file on disk with `baseline`; returns the verdict and the new baseline.
    async fn evaluate(
        &self,
        path: &Path,
        baseline: &Baseline,
        algorithm: ChecksumAlgorithm,
        max_hash_bytes: u64,
    ) -> (bool, Baseline) {
        let (mtime, size) = match observe(path).await {
            Observation::Absent => return (baseline.present, baseline.gone()),
            Observation::Present { mtime, size } => (mtime, size),
        };

        // fast path: an older mtime is still a mismatch and goes to hashing
        if baseline.present && mtime.is_some() && baseline.mtime == mtime && baseline.size == size {
            return (false, baseline.clone());
        }

        let checksum = if size > max_hash_bytes {
            debug!(path = %path.display(), size, "above hashing ceiling, comparing metadata only");
            None
        } else {
            match self.checksum(path, algorithm).await {
                Ok(sum) => Some(sum),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    return (baseline.present, baseline.gone());
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "cannot hash tracked file, treating as changed");
                    let next = Baseline {
                        present: true,
                        mtime,
                        size,
                        checksum: None,
                    };
                    return (true, next);
                }
            }
        };

        let changed = match (&checksum, &baseline.checksum) {
            (Some(current), Some(previous)) => current != previous,
            _ => baseline.mtime.is_none() || baseline.mtime != mtime || baseline.size != size,
        };

        let next = Baseline {
            present: true,
            mtime,
            size,
            checksum,
        };
        (changed, next)
    }

    async fn checksum(&self, path: &Path, algorithm: ChecksumAlgorithm) -> std::io::Result<String> {
        self.inner.checksum_computations.fetch_add(1, Ordering::Relaxed);
        algorithm.digest_file(path).await
    }
}

impl Default for ChecksumTracker {
    fn default() -> Self {
        Self::new(ChecksumAlgorithm::default(), DEFAULT_MAX_HASH_BYTES)
    }
}

impl std::fmt::Debug for ChecksumTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChecksumTracker")
            .field("algorithm", &self.inner.algorithm)
            .field("max_hash_bytes", &self.inner.max_hash_bytes)
            .field("tracked_files", &self.inner.files.lock().len())
            .finish_non_exhaustive()
    }
}

/// Clears the in-flight flag when the scan ends, including on unwind.
struct ScanGuard<'a>(&'a AtomicBool);

impl<'a> ScanGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn observe(path: &Path) -> Observation {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Observation::Present {
            mtime: meta.modified().ok(),
            size: meta.len(),
        },
        Ok(_) => {
            debug!(path = %path.display(), "tracked path is not a regular file");
            Observation::Absent
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Observation::Absent,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "cannot stat tracked file");
            Observation::Absent
        }
    }
}
