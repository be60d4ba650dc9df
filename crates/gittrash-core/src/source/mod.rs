/// Object-store access behind a capability trait
///
/// The extraction core never touches git2 directly. It sees history only
/// through [`HistorySource`], which the git2 backend and the in-memory
/// backend both implement.
pub mod git;
pub mod memory;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use git::GitRepository;
pub use memory::MemoryRepository;

/// Number of hex characters used for commit-scoped output directories
pub const SHORT_ID_LEN: usize = 8;

/// Full hex id of a commit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 8-character prefix used to name output directories
    pub fn short(&self) -> &str {
        let end = self.0.len().min(SHORT_ID_LEN);
        &self.0[..end]
    }
}

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<git2::Oid> for CommitId {
    fn from(oid: git2::Oid) -> Self {
        Self(oid.to_string())
    }
}

/// Full hex id of a blob
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobId(String);

impl BlobId {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<git2::Oid> for BlobId {
    fn from(oid: git2::Oid) -> Self {
        Self(oid.to_string())
    }
}

/// Classification of a single diff entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Deleted,
    Modified,
    Renamed,
    /// Type changes, copies and anything else the backend reports
    Other,
}

/// One entry of a parent → commit diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub kind: ChangeKind,
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    /// Parent-side blob, when the backend exposes one
    pub old_blob: Option<BlobId>,
}

/// Traversal knobs shared by every backend
#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Also start from commits recorded in reflogs
    pub include_reflog: bool,
    /// Report renames as `Renamed` instead of a delete plus an add
    pub detect_renames: bool,
}

/// Read-only view of a version-controlled history
pub trait HistorySource {
    /// Every commit reachable from any reference, parents before children
    fn reachable_commits(&self, options: &WalkOptions) -> Result<Vec<CommitId>>;

    fn parents(&self, commit: &CommitId) -> Result<Vec<CommitId>>;

    /// Changes needed to turn `parent`'s tree into `commit`'s tree
    fn diff(
        &self,
        parent: &CommitId,
        commit: &CommitId,
        options: &WalkOptions,
    ) -> Result<Vec<FileChange>>;

    fn read_blob(&self, blob: &BlobId) -> Result<Vec<u8>>;

    /// Visit every blob in `commit`'s tree recursively with its full path.
    /// The visitor returns false to stop the walk early.
    fn walk_tree(
        &self,
        commit: &CommitId,
        visitor: &mut dyn FnMut(&str, &BlobId) -> bool,
    ) -> Result<()>;
}
