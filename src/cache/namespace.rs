//! Namespace Registry
//!
//! Well-known cache namespaces and the per-namespace retention policy.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

// == Namespace ==
/// Well-known cache partitions used by the tool wrappers and detectors.
///
/// The cache API takes any `AsRef<str>` as a namespace name, so these are a
/// convenience for callers rather than a closed set; names that were not
/// configured degrade to a logged no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    /// Project type detection results
    Project,
    /// Outputs of git commands
    Git,
    /// Module and dependency metadata
    Modules,
    /// Directory listing results
    FileSystem,
    /// Command availability checks
    Commands,
    /// Test run results
    Tests,
    /// Generated suggestions
    Suggestions,
}

impl Namespace {
    pub const ALL: [Namespace; 7] = [
        Namespace::Project,
        Namespace::Git,
        Namespace::Modules,
        Namespace::FileSystem,
        Namespace::Commands,
        Namespace::Tests,
        Namespace::Suggestions,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Project => "project",
            Namespace::Git => "git",
            Namespace::Modules => "modules",
            Namespace::FileSystem => "filesystem",
            Namespace::Commands => "commands",
            Namespace::Tests => "tests",
            Namespace::Suggestions => "suggestions",
        }
    }

    /// Policy used when the configuration does not mention this namespace.
    pub fn default_policy(self) -> NamespacePolicy {
        match self {
            Namespace::Project => NamespacePolicy::new(100, minutes(5)),
            Namespace::Git => NamespacePolicy::new(50, seconds(30)),
            Namespace::Modules => NamespacePolicy::new(200, minutes(10)),
            Namespace::FileSystem => NamespacePolicy::new(500, seconds(60)),
            Namespace::Commands => NamespacePolicy::new(100, minutes(60)),
            Namespace::Tests => NamespacePolicy::new(50, minutes(5)),
            Namespace::Suggestions => NamespacePolicy::new(100, minutes(2)),
        }
    }
}

impl AsRef<str> for Namespace {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Namespace::ALL
            .into_iter()
            .find(|ns| ns.as_str() == s)
            .ok_or_else(|| CacheError::UnknownNamespace(s.to_string()))
    }
}

// == Namespace Policy ==
/// Size bound and time-to-live for one namespace.
///
/// Serialized as `{ "max": <entries>, "ttl": <milliseconds> }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespacePolicy {
    /// Maximum number of live entries
    pub max: usize,
    /// Time-to-live in milliseconds
    pub ttl: u64,
}

impl NamespacePolicy {
    pub const fn new(max: usize, ttl_ms: u64) -> Self {
        Self { max, ttl: ttl_ms }
    }

    pub fn ttl_duration(&self) -> Duration {
        Duration::from_millis(self.ttl)
    }

    /// Rejects zero-sized or zero-lifetime policies.
    pub fn validate(&self, name: &str) -> crate::error::Result<()> {
        if self.max == 0 {
            return Err(CacheError::InvalidConfig(format!(
                "namespace '{}' must allow at least one entry",
                name
            )));
        }
        if self.ttl == 0 {
            return Err(CacheError::InvalidConfig(format!(
                "namespace '{}' must have a ttl greater than zero",
                name
            )));
        }
        Ok(())
    }
}

/// Default policy table keyed by namespace name.
pub fn default_policies() -> BTreeMap<String, NamespacePolicy> {
    Namespace::ALL
        .into_iter()
        .map(|ns| (ns.as_str().to_string(), ns.default_policy()))
        .collect()
}

const fn seconds(n: u64) -> u64 {
    n * 1000
}

const fn minutes(n: u64) -> u64 {
    seconds(n * 60)
}
