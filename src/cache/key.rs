//! Cache key construction
//!
//! A key must encode every input that affects the cached value. Directory
//! paths are canonicalized so `./a` and `/abs/a` land on the same entry, and
//! the remaining parameters are hashed from their sorted-key JSON encoding.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Builds `"<absolute dir>:<params hash>"` for a cacheable computation.
///
/// Object keys in `params` are sorted before hashing, so field order in the
/// caller's struct or map never changes the key. Parameters that fail to
/// serialize hash as `null`.
pub fn cache_key<P: Serialize + ?Sized>(dir: &Path, params: &P) -> String {
    format!("{}:{}", resolve_dir(dir).display(), params_hash(params))
}

/// Short sha256 of the canonical JSON form of `params`.
pub fn params_hash<P: Serialize + ?Sized>(params: &P) -> String {
    // serde_json's default map is ordered, so re-encoding through Value sorts keys
    let canonical = serde_json::to_value(params)
        .and_then(|value| serde_json::to_string(&value))
        .unwrap_or_else(|_| "null".to_string());

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

fn resolve_dir(dir: &Path) -> PathBuf {
    dir.canonicalize().unwrap_or_else(|_| {
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(dir))
                .unwrap_or_else(|_| dir.to_path_buf())
        }
    })
}
