/// libgit2-backed history source
use git2::{
    Delta, DiffFindOptions, DiffOptions, ErrorCode, ObjectType, Oid, Repository, Sort,
    TreeWalkMode, TreeWalkResult,
};
use std::path::{Path, PathBuf};

use super::{BlobId, ChangeKind, CommitId, FileChange, HistorySource, WalkOptions};
use crate::error::{GitTrashError, Result};

pub struct GitRepository {
    repo: Repository,
    path: PathBuf,
}

impl GitRepository {
    /// Open an existing repository; failure is a configuration error
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::open(path).map_err(|e| {
            GitTrashError::Config(format!(
                "{} is not a git repository: {}",
                path.display(),
                e.message()
            ))
        })?;

        tracing::info!("Opened repository at {}", path.display());

        Ok(Self {
            repo,
            path: path.to_path_buf(),
        })
    }

    fn find_commit(&self, id: &CommitId) -> Result<git2::Commit<'_>> {
        let oid = Oid::from_str(id.as_str())?;
        self.repo.find_commit(oid).map_err(|e| not_found(e, id.as_str()))
    }

    /// Push every commit named by the reflog of `name`, returning how many
    fn push_reflog(&self, revwalk: &mut git2::Revwalk<'_>, name: &str) -> Result<usize> {
        let reflog = match self.repo.reflog(name) {
            Ok(reflog) => reflog,
            Err(_) => return Ok(0),
        };

        let mut pushed = 0;
        for entry in reflog.iter() {
            let oid = entry.id_new();
            // Reflog entries may point at objects that were since pruned
            if !oid.is_zero() && self.repo.find_commit(oid).is_ok() {
                revwalk.push(oid)?;
                pushed += 1;
            }
        }
        Ok(pushed)
    }
}

fn not_found(error: git2::Error, what: &str) -> GitTrashError {
    if error.code() == ErrorCode::NotFound {
        GitTrashError::NotFound(what.to_string())
    } else {
        GitTrashError::Git(error)
    }
}

/// Decode a tree path, warning when it is not valid UTF-8
///
/// Lossy decoding can map distinct names onto one string, which then share
/// a dedup entry.
fn decode_path(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(path) => path.to_string(),
        Err(_) => {
            let lossy = String::from_utf8_lossy(bytes).into_owned();
            tracing::warn!(
                "Path \"{}\" is not valid UTF-8, recording it as \"{}\"",
                bytes.escape_ascii(),
                lossy
            );
            lossy
        }
    }
}

fn path_of(file: &git2::DiffFile<'_>) -> Option<String> {
    file.path_bytes().map(decode_path)
}

fn blob_of(file: &git2::DiffFile<'_>) -> Option<BlobId> {
    let oid = file.id();
    if oid.is_zero() {
        None
    } else {
        Some(BlobId::from(oid))
    }
}

impl HistorySource for GitRepository {
    fn reachable_commits(&self, options: &WalkOptions) -> Result<Vec<CommitId>> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME | Sort::REVERSE)?;

        let mut tips = 0usize;
        let mut reflog_entries = 0usize;
        for reference in self.repo.references()? {
            let reference = reference?;
            match reference.peel_to_commit() {
                Ok(commit) => {
                    revwalk.push(commit.id())?;
                    tips += 1;
                }
                Err(_) => {
                    tracing::debug!(
                        "Skipping reference {} (does not point at a commit)",
                        String::from_utf8_lossy(reference.name_bytes())
                    );
                }
            }

            if options.include_reflog {
                if let Some(name) = reference.name() {
                    reflog_entries += self.push_reflog(&mut revwalk, name)?;
                }
            }
        }

        // Detached HEAD is not covered by refs/
        if let Ok(head) = self.repo.head() {
            if let Ok(commit) = head.peel_to_commit() {
                revwalk.push(commit.id())?;
                tips += 1;
            }
        }
        if options.include_reflog {
            reflog_entries += self.push_reflog(&mut revwalk, "HEAD")?;
        }

        if tips == 0 && reflog_entries == 0 {
            tracing::warn!("Repository {} has no commits", self.path.display());
            return Ok(Vec::new());
        }

        let mut commits = Vec::new();
        for oid in revwalk {
            commits.push(CommitId::from(oid?));
        }

        tracing::info!(
            "Found {} commits reachable from {} tips and {} reflog entries",
            commits.len(),
            tips,
            reflog_entries
        );
        Ok(commits)
    }

    fn parents(&self, commit: &CommitId) -> Result<Vec<CommitId>> {
        let commit = self.find_commit(commit)?;
        Ok(commit.parent_ids().map(CommitId::from).collect())
    }

    fn diff(
        &self,
        parent: &CommitId,
        commit: &CommitId,
        options: &WalkOptions,
    ) -> Result<Vec<FileChange>> {
        let parent_tree = self.find_commit(parent)?.tree()?;
        let tree = self.find_commit(commit)?.tree()?;

        let mut diff_opts = DiffOptions::new();
        diff_opts.ignore_filemode(true);

        let mut diff =
            self.repo
                .diff_tree_to_tree(Some(&parent_tree), Some(&tree), Some(&mut diff_opts))?;

        if options.detect_renames {
            let mut find_opts = DiffFindOptions::new();
            find_opts.renames(true);
            diff.find_similar(Some(&mut find_opts))?;
        }

        let changes = diff
            .deltas()
            .map(|delta| {
                let kind = match delta.status() {
                    Delta::Added => ChangeKind::Added,
                    Delta::Deleted => ChangeKind::Deleted,
                    Delta::Modified => ChangeKind::Modified,
                    Delta::Renamed => ChangeKind::Renamed,
                    _ => ChangeKind::Other,
                };
                FileChange {
                    kind,
                    old_path: path_of(&delta.old_file()),
                    new_path: path_of(&delta.new_file()),
                    old_blob: blob_of(&delta.old_file()),
                }
            })
            .collect();

        Ok(changes)
    }

    fn read_blob(&self, blob: &BlobId) -> Result<Vec<u8>> {
        let oid = Oid::from_str(blob.as_str())?;
        let blob = self
            .repo
            .find_blob(oid)
            .map_err(|e| not_found(e, blob.as_str()))?;
        Ok(blob.content().to_vec())
    }

    fn walk_tree(
        &self,
        commit: &CommitId,
        visitor: &mut dyn FnMut(&str, &BlobId) -> bool,
    ) -> Result<()> {
        let tree = self.find_commit(commit)?.tree()?;

        let mut stopped = false;
        let walked = tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() != Some(ObjectType::Blob) {
                return TreeWalkResult::Ok;
            }
            let path = format!("{}{}", root, decode_path(entry.name_bytes()));
            if visitor(&path, &BlobId::from(entry.id())) {
                TreeWalkResult::Ok
            } else {
                stopped = true;
                TreeWalkResult::Abort
            }
        });

        match walked {
            // An aborted walk surfaces as an error from libgit2
            Err(e) if !stopped => Err(e.into()),
            _ => Ok(()),
        }
    }
}
