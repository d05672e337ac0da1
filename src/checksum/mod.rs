//! Checksum Module
//!
//! Polling file change detection used to invalidate cache namespaces.

mod algorithm;
mod callback;
mod tracker;

pub use algorithm::ChecksumAlgorithm;
pub use callback::ChangeCallback;
pub use tracker::{ChecksumTracker, ScanOutcome, TrackOptions, TrackerStats, DEFAULT_MAX_HASH_BYTES};
