//! Background Tasks Module
//!
//! Periodic maintenance that runs alongside the cache.
//!
//! # Tasks
//! - Sweep: removes expired cache entries at the configured interval
//!
//! The checksum watch loop lives with the tracker, see
//! [`ChecksumTracker::start_watching`](crate::checksum::ChecksumTracker::start_watching).

mod sweep;

pub use sweep::spawn_sweep_task;
