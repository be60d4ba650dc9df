/// In-memory history source
///
/// Builds small commit graphs without touching disk. Used by the test
/// suite and by embedders that already hold history in memory.
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use super::{BlobId, ChangeKind, CommitId, FileChange, HistorySource, WalkOptions};
use crate::error::{GitTrashError, Result};
use crate::hashing::{calculate_hash, HashAlgorithm};

#[derive(Debug, Clone)]
struct MemoryCommit {
    parents: Vec<CommitId>,
    files: BTreeMap<String, BlobId>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    order: Vec<CommitId>,
    commits: HashMap<CommitId, MemoryCommit>,
    blobs: HashMap<BlobId, Vec<u8>>,
    refs: BTreeMap<String, CommitId>,
    omit_blob_handles: bool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id a blob with this content would get
    pub fn blob_id(content: &[u8]) -> BlobId {
        let mut header = format!("blob {}\0", content.len()).into_bytes();
        header.extend_from_slice(content);
        BlobId::new(calculate_hash(&header, HashAlgorithm::Sha1))
    }

    /// Add a commit holding exactly `files` as its snapshot
    pub fn commit<C: AsRef<[u8]>>(
        &mut self,
        parents: &[&CommitId],
        files: &[(&str, C)],
    ) -> CommitId {
        let mut snapshot = BTreeMap::new();
        for (path, content) in files {
            let content = content.as_ref();
            let blob = Self::blob_id(content);
            self.blobs.entry(blob.clone()).or_insert_with(|| content.to_vec());
            snapshot.insert(path.to_string(), blob);
        }

        let mut descriptor = format!("commit {}\n", self.order.len());
        for parent in parents {
            descriptor.push_str(&format!("parent {}\n", parent));
        }
        for (path, blob) in &snapshot {
            descriptor.push_str(&format!("{} {}\n", blob, path));
        }
        let id = CommitId::new(calculate_hash(descriptor.as_bytes(), HashAlgorithm::Sha1));

        self.commits.insert(
            id.clone(),
            MemoryCommit {
                parents: parents.iter().map(|p| (*p).clone()).collect(),
                files: snapshot,
            },
        );
        self.order.push(id.clone());
        id
    }

    /// Point a reference at a commit
    pub fn set_ref(&mut self, name: &str, commit: &CommitId) {
        self.refs.insert(name.to_string(), commit.clone());
    }

    /// Stop exposing blob handles on deletions, forcing path-based lookup
    pub fn without_blob_handles(mut self) -> Self {
        self.omit_blob_handles = true;
        self
    }

    /// Drop a blob from the store, as if it were pruned
    pub fn remove_blob(&mut self, blob: &BlobId) -> bool {
        self.blobs.remove(blob).is_some()
    }

    fn get(&self, id: &CommitId) -> Result<&MemoryCommit> {
        self.commits
            .get(id)
            .ok_or_else(|| GitTrashError::NotFound(id.to_string()))
    }
}

impl HistorySource for MemoryRepository {
    fn reachable_commits(&self, _options: &WalkOptions) -> Result<Vec<CommitId>> {
        let mut reachable = HashSet::new();
        let mut queue: VecDeque<CommitId> = self.refs.values().cloned().collect();

        while let Some(id) = queue.pop_front() {
            if !reachable.insert(id.clone()) {
                continue;
            }
            queue.extend(self.get(&id)?.parents.iter().cloned());
        }

        // Parents always precede their children in insertion order
        Ok(self
            .order
            .iter()
            .filter(|id| reachable.contains(*id))
            .cloned()
            .collect())
    }

    fn parents(&self, commit: &CommitId) -> Result<Vec<CommitId>> {
        Ok(self.get(commit)?.parents.clone())
    }

    fn diff(
        &self,
        parent: &CommitId,
        commit: &CommitId,
        options: &WalkOptions,
    ) -> Result<Vec<FileChange>> {
        let old = &self.get(parent)?.files;
        let new = &self.get(commit)?.files;

        let mut changes = Vec::new();
        for (path, blob) in old {
            match new.get(path) {
                None => changes.push(FileChange {
                    kind: ChangeKind::Deleted,
                    old_path: Some(path.clone()),
                    new_path: None,
                    old_blob: (!self.omit_blob_handles).then(|| blob.clone()),
                }),
                Some(current) if current != blob => changes.push(FileChange {
                    kind: ChangeKind::Modified,
                    old_path: Some(path.clone()),
                    new_path: Some(path.clone()),
                    old_blob: Some(blob.clone()),
                }),
                Some(_) => {}
            }
        }
        for path in new.keys().filter(|path| !old.contains_key(*path)) {
            changes.push(FileChange {
                kind: ChangeKind::Added,
                old_path: None,
                new_path: Some(path.clone()),
                old_blob: None,
            });
        }

        if options.detect_renames {
            pair_renames(&mut changes, new);
        }

        Ok(changes)
    }

    fn read_blob(&self, blob: &BlobId) -> Result<Vec<u8>> {
        self.blobs
            .get(blob)
            .cloned()
            .ok_or_else(|| GitTrashError::NotFound(blob.to_string()))
    }

    fn walk_tree(
        &self,
        commit: &CommitId,
        visitor: &mut dyn FnMut(&str, &BlobId) -> bool,
    ) -> Result<()> {
        for (path, blob) in &self.get(commit)?.files {
            if !visitor(path, blob) {
                break;
            }
        }
        Ok(())
    }
}

/// Fold exact-content delete/add pairs into renames
fn pair_renames(changes: &mut Vec<FileChange>, new: &BTreeMap<String, BlobId>) {
    let mut claimed = HashSet::new();
    let mut renames = Vec::new();

    for (i, change) in changes.iter().enumerate() {
        if change.kind != ChangeKind::Deleted {
            continue;
        }
        let Some(old_path) = change.old_path.as_ref() else {
            continue;
        };
        let deleted_blob = change.old_blob.clone();
        let added = changes.iter().enumerate().find(|(j, c)| {
            c.kind == ChangeKind::Added
                && !claimed.contains(j)
                && c.new_path.as_ref().and_then(|p| new.get(p)) == deleted_blob.as_ref()
                && deleted_blob.is_some()
        });
        if let Some((j, add)) = added {
            claimed.insert(j);
            claimed.insert(i);
            renames.push(FileChange {
                kind: ChangeKind::Renamed,
                old_path: Some(old_path.clone()),
                new_path: add.new_path.clone(),
                old_blob: deleted_blob,
            });
        }
    }

    let mut index = 0;
    changes.retain(|_| {
        let keep = !claimed.contains(&index);
        index += 1;
        keep
    });
    changes.extend(renames);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreferenced_commits_are_not_reachable() {
        let mut repo = MemoryRepository::new();
        let a = repo.commit(&[], &[("a.txt", "a")]);
        let b = repo.commit(&[&a], &[("a.txt", "b")]);
        let dangling = repo.commit::<&str>(&[&a], &[]);
        repo.set_ref("refs/heads/main", &b);

        let commits = repo.reachable_commits(&WalkOptions::default()).unwrap();
        assert_eq!(commits, vec![a, b]);
        assert!(!commits.contains(&dangling));
    }

    #[test]
    fn test_diff_classifies_changes() {
        let mut repo = MemoryRepository::new();
        let a = repo.commit(&[], &[("gone.pem", "key"), ("readme.md", "v1")]);
        let b = repo.commit(&[&a], &[("readme.md", "v2"), ("new.txt", "n")]);

        let changes = repo.diff(&a, &b, &WalkOptions::default()).unwrap();
        let kinds: Vec<_> = changes.iter().map(|c| c.kind).collect();

        assert_eq!(
            kinds,
            vec![ChangeKind::Deleted, ChangeKind::Modified, ChangeKind::Added]
        );
        assert_eq!(changes[0].old_blob, Some(MemoryRepository::blob_id(b"key")));
    }

    #[test]
    fn test_rename_detection() {
        let mut repo = MemoryRepository::new();
        let a = repo.commit(&[], &[("old/id_rsa", "secret")]);
        let b = repo.commit(&[&a], &[("new/id_rsa", "secret")]);

        let plain = repo.diff(&a, &b, &WalkOptions::default()).unwrap();
        assert_eq!(plain.len(), 2);

        let options = WalkOptions {
            detect_renames: true,
            ..Default::default()
        };
        let renamed = repo.diff(&a, &b, &options).unwrap();
        assert_eq!(renamed.len(), 1);
        assert_eq!(renamed[0].kind, ChangeKind::Renamed);
        assert_eq!(renamed[0].new_path.as_deref(), Some("new/id_rsa"));
    }

    #[test]
    fn test_blob_handles_can_be_hidden() {
        let mut repo = MemoryRepository::new();
        let a = repo.commit(&[], &[("x.key", "x")]);
        let b = repo.commit::<&str>(&[&a], &[]);
        let repo = repo.without_blob_handles();

        let changes = repo.diff(&a, &b, &WalkOptions::default()).unwrap();
        assert_eq!(changes[0].kind, ChangeKind::Deleted);
        assert!(changes[0].old_blob.is_none());
    }
}
