/// Pre-deletion content lookup
///
/// Two strategies sit behind one resolver and are tried in order:
/// - `DirectBlob` reads the blob handle the diff entry carried (O(1))
/// - `TreeWalk` walks the parent tree and reads the entry whose full path
///   equals the deleted path (O(tree size))
///
/// In `Auto` mode a strategy that keeps failing is demoted for the rest of
/// the run, as long as a later strategy remains to fall back on.
use serde::{Deserialize, Serialize};

use crate::error::{GitTrashError, Result};
use crate::source::{BlobId, HistorySource};
use crate::walker::DeletionEvent;

/// Failures after which a non-final strategy is skipped in `Auto` mode
pub const DIRECT_FAILURE_LIMIT: usize = 8;

pub trait ResolveStrategy {
    fn name(&self) -> &'static str;

    /// Ok(None) when the strategy does not apply to or cannot locate the
    /// event; Err when it tried and the store failed.
    fn resolve(&self, source: &dyn HistorySource, event: &DeletionEvent)
        -> Result<Option<Vec<u8>>>;
}

/// Fast path: dereference the handle carried by the diff entry
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectBlob;

impl ResolveStrategy for DirectBlob {
    fn name(&self) -> &'static str {
        "direct-blob"
    }

    fn resolve(
        &self,
        source: &dyn HistorySource,
        event: &DeletionEvent,
    ) -> Result<Option<Vec<u8>>> {
        match &event.blob {
            Some(blob) => source.read_blob(blob).map(Some),
            None => Ok(None),
        }
    }
}

/// Fallback: full recursive walk of the parent tree
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeWalk;

impl ResolveStrategy for TreeWalk {
    fn name(&self) -> &'static str {
        "tree-walk"
    }

    fn resolve(
        &self,
        source: &dyn HistorySource,
        event: &DeletionEvent,
    ) -> Result<Option<Vec<u8>>> {
        let mut found: Option<BlobId> = None;
        source.walk_tree(&event.parent, &mut |path, blob| {
            if path == event.path {
                found = Some(blob.clone());
                false
            } else {
                true
            }
        })?;

        match found {
            Some(blob) => source.read_blob(&blob).map(Some),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolveMode {
    /// Direct blob first, tree walk as fallback
    #[default]
    Auto,
    DirectOnly,
    TreeWalkOnly,
}

/// Bytes of a deleted file and the strategy that produced them
#[derive(Debug, Clone)]
pub struct Resolved {
    pub bytes: Vec<u8>,
    pub strategy: &'static str,
}

pub struct BlobResolver {
    strategies: Vec<Box<dyn ResolveStrategy>>,
    failures: Vec<usize>,
    demote_failing: bool,
}

impl BlobResolver {
    pub fn new(mode: ResolveMode) -> Self {
        let strategies: Vec<Box<dyn ResolveStrategy>> = match mode {
            ResolveMode::Auto => vec![Box::new(DirectBlob), Box::new(TreeWalk)],
            ResolveMode::DirectOnly => vec![Box::new(DirectBlob)],
            ResolveMode::TreeWalkOnly => vec![Box::new(TreeWalk)],
        };
        let mut resolver = Self::with_strategies(strategies);
        resolver.demote_failing = mode == ResolveMode::Auto;
        resolver
    }

    /// Resolver over a custom strategy chain, never demoting
    pub fn with_strategies(strategies: Vec<Box<dyn ResolveStrategy>>) -> Self {
        let failures = vec![0; strategies.len()];
        Self {
            strategies,
            failures,
            demote_failing: false,
        }
    }

    fn is_demoted(&self, index: usize) -> bool {
        self.demote_failing
            && index + 1 < self.strategies.len()
            && self.failures[index] >= DIRECT_FAILURE_LIMIT
    }

    /// Try each strategy in order until one yields the content
    pub fn resolve(
        &mut self,
        source: &dyn HistorySource,
        event: &DeletionEvent,
    ) -> Result<Resolved> {
        let mut attempts = Vec::new();

        for index in 0..self.strategies.len() {
            let name = self.strategies[index].name();
            if self.is_demoted(index) {
                attempts.push(format!("{}: skipped after repeated failures", name));
                continue;
            }

            match self.strategies[index].resolve(source, event) {
                Ok(Some(bytes)) => {
                    tracing::debug!("Resolved {} via {}", event.path, name);
                    return Ok(Resolved {
                        bytes,
                        strategy: name,
                    });
                }
                Ok(None) => attempts.push(format!("{}: not found", name)),
                Err(e) => {
                    self.failures[index] += 1;
                    if self.is_demoted(index) {
                        tracing::warn!(
                            "Strategy {} failed {} times, falling back for the rest of the run",
                            name,
                            self.failures[index]
                        );
                    }
                    attempts.push(format!("{}: {}", name, e));
                }
            }
        }

        Err(GitTrashError::Resolve {
            commit: event.parent.short().to_string(),
            path: event.path.clone(),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemoryRepository, WalkOptions};
    use crate::walker::HistoryWalker;

    fn deleted_event(repo: &MemoryRepository) -> DeletionEvent {
        let walker = HistoryWalker::new(repo, WalkOptions::default());
        let commits = walker.commits().unwrap();
        walker.deletions(commits.last().unwrap()).unwrap().remove(0)
    }

    fn nested_deletion() -> MemoryRepository {
        let mut repo = MemoryRepository::new();
        let a = repo.commit(
            &[],
            &[("deploy/keys/prod.pem", "PROD KEY"), ("deploy/readme", "r")],
        );
        let b = repo.commit(&[&a], &[("deploy/readme", "r")]);
        repo.set_ref("refs/heads/main", &b);
        repo
    }

    #[test]
    fn test_direct_blob_reads_handle() {
        let repo = nested_deletion();
        let event = deleted_event(&repo);

        let bytes = DirectBlob.resolve(&repo, &event).unwrap();
        assert_eq!(bytes.as_deref(), Some(&b"PROD KEY"[..]));
    }

    #[test]
    fn test_direct_blob_without_handle_is_not_applicable() {
        let repo = nested_deletion().without_blob_handles();
        let event = deleted_event(&repo);

        assert!(event.blob.is_none());
        assert!(DirectBlob.resolve(&repo, &event).unwrap().is_none());
    }

    #[test]
    fn test_tree_walk_finds_nested_path() {
        let repo = nested_deletion().without_blob_handles();
        let event = deleted_event(&repo);

        let bytes = TreeWalk.resolve(&repo, &event).unwrap();
        assert_eq!(bytes.as_deref(), Some(&b"PROD KEY"[..]));
    }

    #[test]
    fn test_tree_walk_missing_path() {
        let repo = nested_deletion();
        let mut event = deleted_event(&repo);
        event.path = "deploy/keys/other.pem".to_string();

        assert!(TreeWalk.resolve(&repo, &event).unwrap().is_none());
    }

    #[test]
    fn test_auto_falls_back_to_tree_walk() {
        let repo = nested_deletion().without_blob_handles();
        let event = deleted_event(&repo);

        let mut resolver = BlobResolver::new(ResolveMode::Auto);
        let resolved = resolver.resolve(&repo, &event).unwrap();
        assert_eq!(resolved.strategy, "tree-walk");
        assert_eq!(resolved.bytes, b"PROD KEY");
    }

    #[test]
    fn test_direct_only_fails_without_handle() {
        let repo = nested_deletion().without_blob_handles();
        let event = deleted_event(&repo);

        let mut resolver = BlobResolver::new(ResolveMode::DirectOnly);
        let err = resolver.resolve(&repo, &event).unwrap_err();
        assert!(matches!(err, GitTrashError::Resolve { ref path, .. } if path == "deploy/keys/prod.pem"));
    }

    #[test]
    fn test_pruned_blob_fails_both_strategies() {
        let mut repo = nested_deletion();
        let event = deleted_event(&repo);
        repo.remove_blob(event.blob.as_ref().unwrap());

        let mut resolver = BlobResolver::new(ResolveMode::Auto);
        match resolver.resolve(&repo, &event).unwrap_err() {
            GitTrashError::Resolve { attempts, .. } => {
                assert_eq!(attempts.len(), 2);
                assert!(attempts[0].starts_with("direct-blob"));
                assert!(attempts[1].starts_with("tree-walk"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_repeatedly_failing_direct_strategy_is_demoted() {
        let mut repo = nested_deletion();
        let event = deleted_event(&repo);
        repo.remove_blob(event.blob.as_ref().unwrap());

        let mut resolver = BlobResolver::new(ResolveMode::Auto);
        for _ in 0..DIRECT_FAILURE_LIMIT {
            assert!(resolver.resolve(&repo, &event).is_err());
        }

        match resolver.resolve(&repo, &event).unwrap_err() {
            GitTrashError::Resolve { attempts, .. } => {
                assert_eq!(attempts[0], "direct-blob: skipped after repeated failures");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
