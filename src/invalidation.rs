//! Invalidation wiring
//!
//! Binds well-known project files to the cache namespaces whose contents
//! depend on them. Each rule registers one tracker callback that clears all
//! of its namespaces when the file changes.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::cache::Namespace::{Commands, FileSystem, Git, Modules, Project, Suggestions, Tests};
use crate::cache::{Cache, Namespace};
use crate::checksum::{ChangeCallback, ChecksumTracker};

/// A file, relative to the project root, and the namespaces it invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidationRule {
    pub file: &'static str,
    pub namespaces: &'static [Namespace],
}

impl InvalidationRule {
    pub const fn new(file: &'static str, namespaces: &'static [Namespace]) -> Self {
        Self { file, namespaces }
    }
}

/// Default rule table.
pub const DEFAULT_RULES: &[InvalidationRule] = &[
    // package manifests
    InvalidationRule::new("package.json", &[Project, Modules, Commands, Tests, Suggestions]),
    InvalidationRule::new("Cargo.toml", &[Project, Modules, Tests, Suggestions]),
    InvalidationRule::new("pyproject.toml", &[Project, Modules, Tests, Suggestions]),
    InvalidationRule::new("go.mod", &[Project, Modules, Suggestions]),
    // lockfiles
    InvalidationRule::new("package-lock.json", &[Modules]),
    InvalidationRule::new("yarn.lock", &[Modules]),
    InvalidationRule::new("pnpm-lock.yaml", &[Modules]),
    InvalidationRule::new("Cargo.lock", &[Modules]),
    InvalidationRule::new("go.sum", &[Modules]),
    InvalidationRule::new("requirements.txt", &[Modules]),
    // module system markers
    InvalidationRule::new("tsconfig.json", &[Project, Suggestions]),
    // vcs state
    InvalidationRule::new(".git/HEAD", &[Git, Suggestions]),
    InvalidationRule::new(".git/index", &[Git, FileSystem]),
    InvalidationRule::new(".git/packed-refs", &[Git]),
    InvalidationRule::new(".gitignore", &[FileSystem]),
    // build files
    InvalidationRule::new("Makefile", &[Project, Commands, Suggestions]),
];

/// Namespaces cleared when the branch `HEAD` points at moves.
const HEAD_REF_NAMESPACES: &[Namespace] = &[Git, Suggestions];

/// Registers [`DEFAULT_RULES`] for the project at `root`, plus the loose ref
/// file of the currently checked-out branch.
///
/// Returns the number of rules registered.
pub async fn wire_invalidation(cache: &Cache, tracker: &ChecksumTracker, root: &Path) -> usize {
    let mut registered = wire_rules(cache, tracker, root, DEFAULT_RULES).await;

    // commits rewrite the branch ref and leave HEAD untouched
    if let Some(branch_ref) = head_ref(root).await {
        debug!(path = %branch_ref.display(), "tracking checked-out branch ref");
        tracker.track(branch_ref, invalidating(cache, HEAD_REF_NAMESPACES)).await;
        registered += 1;
    }
    registered
}

/// Registers `rules` for the project at `root`.
pub async fn wire_rules(
    cache: &Cache,
    tracker: &ChecksumTracker,
    root: &Path,
    rules: &[InvalidationRule],
) -> usize {
    for rule in rules {
        tracker.track(root.join(rule.file), invalidating(cache, rule.namespaces)).await;
    }

    info!(root = %root.display(), rules = rules.len(), "cache invalidation wired");
    rules.len()
}

fn invalidating(cache: &Cache, namespaces: &'static [Namespace]) -> ChangeCallback {
    let cache = cache.clone();
    ChangeCallback::sync(move |path| {
        for namespace in namespaces {
            let removed = cache.invalidate(namespace, None);
            debug!(path = %path.display(), namespace = %namespace, removed, "namespace invalidated");
        }
        Ok(())
    })
}

/// Resolves a symbolic `.git/HEAD` (`ref: refs/heads/<branch>`) to its loose
/// ref file. Detached or missing heads resolve to nothing.
async fn head_ref(root: &Path) -> Option<PathBuf> {
    let git_dir = root.join(".git");
    let head = tokio::fs::read_to_string(git_dir.join("HEAD")).await.ok()?;
    let target = Path::new(head.strip_prefix("ref:")?.trim());

    let contained = target.starts_with("refs")
        && target.components().all(|part| matches!(part, Component::Normal(_)));
    contained.then(|| git_dir.join(target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_rule_files_are_unique() {
        let mut seen = HashSet::new();
        for rule in DEFAULT_RULES {
            assert!(seen.insert(rule.file), "duplicate rule for {}", rule.file);
            assert!(!rule.namespaces.is_empty(), "{} invalidates nothing", rule.file);
        }
    }

    #[test]
    fn test_vcs_head_invalidates_git() {
        let head = DEFAULT_RULES
            .iter()
            .find(|rule| rule.file == ".git/HEAD")
            .unwrap();
        assert!(head.namespaces.contains(&Namespace::Git));
    }

    fn git_repo(head: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let git = dir.path().join(".git");
        std::fs::create_dir_all(git.join("refs/heads")).unwrap();
        std::fs::write(git.join("HEAD"), head).unwrap();
        std::fs::write(git.join("refs/heads/main"), "1111111111111111111111111111111111111111\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_head_ref_resolution() {
        let symbolic = git_repo("ref: refs/heads/main\n");
        assert_eq!(
            head_ref(symbolic.path()).await,
            Some(symbolic.path().join(".git/refs/heads/main"))
        );

        let detached = git_repo("1111111111111111111111111111111111111111\n");
        assert_eq!(head_ref(detached.path()).await, None);

        let escaping = git_repo("ref: refs/../../outside\n");
        assert_eq!(head_ref(escaping.path()).await, None);

        let empty = tempfile::tempdir().unwrap();
        assert_eq!(head_ref(empty.path()).await, None);
    }

    #[tokio::test]
    async fn test_commit_on_current_branch_invalidates_git() {
        let dir = git_repo("ref: refs/heads/main\n");
        let cache = Cache::new(&crate::config::CacheConfig::default()).unwrap();
        let tracker = ChecksumTracker::default();

        let registered = wire_invalidation(&cache, &tracker, dir.path()).await;
        assert_eq!(registered, DEFAULT_RULES.len() + 1);

        cache.set(Namespace::Git, "last-commit", "1111111");
        cache.set(Namespace::Modules, "deps", vec!["serde"]);
        let branch = dir.path().join(".git/refs/heads/main");
        let before = std::fs::metadata(&branch).unwrap().modified().unwrap();
        std::fs::write(&branch, "2222222222222222222222222222222222222222\n").unwrap();
        // same-length rewrite; keep the mtime distinct on coarse clocks
        std::fs::File::options()
            .write(true)
            .open(&branch)
            .unwrap()
            .set_modified(before + std::time::Duration::from_secs(1))
            .unwrap();

        let outcome = tracker.check_all().await;

        assert_eq!(outcome.changed().to_vec(), vec![branch]);
        assert_eq!(cache.get::<String>(Namespace::Git, "last-commit"), None);
        assert_eq!(cache.get::<Vec<String>>(Namespace::Modules, "deps"), Some(vec!["serde".to_string()]));
    }

    #[tokio::test]
    async fn test_wiring_tracks_every_rule_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(&crate::config::CacheConfig::default()).unwrap();
        let tracker = ChecksumTracker::default();

        let registered = wire_invalidation(&cache, &tracker, dir.path()).await;

        assert_eq!(registered, DEFAULT_RULES.len());
        let tracked = tracker.tracked_paths();
        for rule in DEFAULT_RULES {
            assert!(tracked.contains(&dir.path().join(rule.file)));
        }
    }
}
