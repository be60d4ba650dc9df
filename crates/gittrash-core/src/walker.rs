/// History traversal: commits from every reference and their deletions
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::Result;
use crate::source::{BlobId, ChangeKind, CommitId, FileChange, HistorySource, WalkOptions};

/// A path present in `parent` and absent in `commit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionEvent {
    pub commit: CommitId,
    pub parent: CommitId,
    /// Logical path as it existed in the parent
    pub path: String,
    /// Parent-side blob handle, if the diff backend exposed one
    pub blob: Option<BlobId>,
}

pub struct HistoryWalker<'a> {
    source: &'a dyn HistorySource,
    options: WalkOptions,
}

impl<'a> HistoryWalker<'a> {
    pub fn new(source: &'a dyn HistorySource, options: WalkOptions) -> Self {
        Self { source, options }
    }

    /// Every reachable commit, each exactly once, in backend order
    pub fn commits(&self) -> Result<Vec<CommitId>> {
        let mut seen = HashSet::new();
        let commits: Vec<CommitId> = self
            .source
            .reachable_commits(&self.options)?
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();

        tracing::debug!("History walk covers {} commits", commits.len());
        Ok(commits)
    }

    /// Union of the diffs against each parent. Root commits have none.
    pub fn changes(&self, commit: &CommitId) -> Result<Vec<(CommitId, FileChange)>> {
        let mut changes = Vec::new();
        for parent in self.source.parents(commit)? {
            for change in self.source.diff(&parent, commit, &self.options)? {
                changes.push((parent.clone(), change));
            }
        }
        Ok(changes)
    }

    /// Deletion events of `commit` relative to each of its parents
    pub fn deletions(&self, commit: &CommitId) -> Result<Vec<DeletionEvent>> {
        let events = self
            .changes(commit)?
            .into_iter()
            .filter(|(_, change)| change.kind == ChangeKind::Deleted)
            .filter_map(|(parent, change)| {
                change.old_path.map(|path| DeletionEvent {
                    commit: commit.clone(),
                    parent,
                    path,
                    blob: change.old_blob,
                })
            })
            .collect();
        Ok(events)
    }
}
