//! Error types for the caching subsystem
//!
//! Provides unified error handling using thiserror. None of these errors ever
//! reach a cache consumer through `get`/`set`/`invalidate`; they surface from
//! configuration loading and from the checksum tracker's internals, and are
//! otherwise only logged.

use std::path::PathBuf;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the caching subsystem.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Namespace name not present in the registry
    #[error("Unknown namespace: {0}")]
    UnknownNamespace(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Filesystem access failed for a tracked path
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Value or configuration could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A change callback failed
    #[error("Callback failed for {path}: {message}")]
    Callback { path: PathBuf, message: String },
}

impl CacheError {
    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the caching subsystem.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display_includes_path() {
        let err = CacheError::io(
            "/tmp/missing.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/missing.json"));
        assert!(msg.contains("gone"));
    }

    #[test]
    fn test_serialization_error_converts() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: CacheError = parse.unwrap_err().into();
        assert!(matches!(err, CacheError::Serialization(_)));
    }
}
