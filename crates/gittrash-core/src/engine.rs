/// Extraction engine: walks history and materializes deleted files
///
/// Each deletion event ends in exactly one outcome:
/// `FilteredOut`, `Duplicate`, `ResolveFailed`, `WriteFailed` or `Written`.
/// Outcomes are collected rather than thrown, so a single bad blob or an
/// unwritable file never stops the walk unless the failure policy says so.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::config::{ExtractionConfig, MatchMode};
use crate::dedup::ContentDeduplicator;
use crate::error::{GitTrashError, Result};
use crate::hashing::calculate_hash;
use crate::manifest::{HashManifest, Manifest, WrittenFile};
use crate::report::RunSummary;
use crate::resolver::BlobResolver;
use crate::source::{CommitId, HistorySource};
use crate::walker::{DeletionEvent, HistoryWalker};

/// Terminal state of one deletion event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventOutcome {
    /// Path matched no pattern
    FilteredOut,
    /// Same content at the same path was already written
    Duplicate,
    ResolveFailed(String),
    WriteFailed(String),
    /// Output path, relative to the output root
    Written(PathBuf),
}

impl EventOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            EventOutcome::ResolveFailed(_) | EventOutcome::WriteFailed(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event: DeletionEvent,
    pub outcome: EventOutcome,
    /// Resolution strategy that produced the bytes, if any
    pub strategy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStatistics {
    pub commits_walked: usize,
    pub deletion_events: usize,
    pub filtered_out: usize,
    pub duplicates: usize,
    pub resolve_failures: usize,
    pub write_failures: usize,
    pub written: usize,
    pub bytes_written: u64,
    pub resolved_by: BTreeMap<String, usize>,
}

impl ExtractionStatistics {
    pub fn files_found(&self) -> usize {
        self.written + self.duplicates
    }

    fn count(&mut self, record: &EventRecord) {
        self.deletion_events += 1;
        match &record.outcome {
            EventOutcome::FilteredOut => self.filtered_out += 1,
            EventOutcome::Duplicate => self.duplicates += 1,
            EventOutcome::ResolveFailed(_) => self.resolve_failures += 1,
            EventOutcome::WriteFailed(_) => self.write_failures += 1,
            EventOutcome::Written(_) => self.written += 1,
        }
        if let Some(strategy) = &record.strategy {
            *self.resolved_by.entry(strategy.clone()).or_insert(0) += 1;
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExtractionProgress {
    WalkStarted {
        total_commits: usize,
    },
    EventFinished(EventRecord),
    CommitFinished {
        index: usize,
        commit: CommitId,
        deletions: usize,
    },
}

#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub run_id: String,
    pub records: Vec<EventRecord>,
    pub manifest: Manifest,
    pub written: Vec<WrittenFile>,
    pub statistics: ExtractionStatistics,
    pub summary: RunSummary,
    /// Location of `gittrash.log`, absent when nothing was recovered
    pub manifest_path: Option<PathBuf>,
    pub hash_manifest_path: Option<PathBuf>,
}

/// Mutable tracking state owned by a single run
struct RunState {
    dedup: ContentDeduplicator,
    manifest: Manifest,
    hash_manifest: HashManifest,
    records: Vec<EventRecord>,
    statistics: ExtractionStatistics,
    /// Output paths already claimed, relative to the output root
    output_names: HashSet<PathBuf>,
}

/// `a/b/c.pem` → `a_b_c.pem`
pub fn flatten_path(path: &str) -> String {
    path.replace('/', "_")
}

/// Output location of a deletion event, relative to the output root
pub fn output_relative_path(commit: &CommitId, path: &str) -> PathBuf {
    Path::new(commit.short()).join(flatten_path(path))
}

/// Claim a unique output path for `event` within this run
///
/// Two events of one commit can share a flattened name: a merge deleting a
/// path whose content differs per parent, or `a/b_c` next to `a_b/c`.
/// Later claimants get `~<parent8>` appended, then `-1`, `-2`, ...
fn claim_output_path(used: &mut HashSet<PathBuf>, event: &DeletionEvent) -> PathBuf {
    let preferred = output_relative_path(&event.commit, &event.path);
    if used.insert(preferred.clone()) {
        return preferred;
    }

    let dir = Path::new(event.commit.short());
    let stem = format!("{}~{}", flatten_path(&event.path), event.parent.short());
    let mut candidate = dir.join(&stem);
    let mut suffix = 1;
    while !used.insert(candidate.clone()) {
        candidate = dir.join(format!("{}-{}", stem, suffix));
        suffix += 1;
    }

    tracing::warn!(
        "{} {}: output name {} already taken, writing to {}",
        event.commit.short(),
        event.path,
        preferred.display(),
        candidate.display()
    );
    candidate
}

pub struct ExtractionEngine<'a> {
    source: &'a dyn HistorySource,
    config: ExtractionConfig,
    repository: Option<PathBuf>,
    progress_callback: Option<Box<dyn Fn(&ExtractionProgress) + 'a>>,
}

impl<'a> ExtractionEngine<'a> {
    pub fn new(source: &'a dyn HistorySource, config: ExtractionConfig) -> Self {
        Self {
            source,
            config,
            repository: None,
            progress_callback: None,
        }
    }

    /// Record the repository path in the hash manifest
    pub fn set_repository_path(&mut self, path: impl Into<PathBuf>) {
        self.repository = Some(path.into());
    }

    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: Fn(&ExtractionProgress) + 'a,
    {
        self.progress_callback = Some(Box::new(callback));
    }

    fn emit_progress(&self, progress: ExtractionProgress) {
        if let Some(callback) = &self.progress_callback {
            callback(&progress);
        }
    }

    /// Walk the full history once and extract every candidate deletion
    pub fn run(&self) -> Result<ExtractionResult> {
        let output_dir = &self.config.output_dir;
        std::fs::create_dir_all(output_dir).map_err(|e| {
            GitTrashError::Config(format!(
                "Cannot create output directory {}: {}",
                output_dir.display(),
                e
            ))
        })?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let mut hash_manifest = HashManifest::new(run_id.clone(), self.config.hash_algorithm);
        hash_manifest.repository = self.repository.clone();

        let mut state = RunState {
            dedup: ContentDeduplicator::new(),
            manifest: Manifest::new(),
            hash_manifest,
            records: Vec::new(),
            statistics: ExtractionStatistics::default(),
            output_names: HashSet::new(),
        };
        let mut resolver = BlobResolver::new(self.config.resolve_mode);

        let walker = HistoryWalker::new(self.source, self.config.walk.clone());
        let commits = walker.commits()?;
        tracing::info!("Starting extraction over {} commits", commits.len());
        self.emit_progress(ExtractionProgress::WalkStarted {
            total_commits: commits.len(),
        });

        for (index, commit) in commits.iter().enumerate() {
            let deletions = walker.deletions(commit)?;
            let count = deletions.len();

            for event in deletions {
                let record = self.process_event(&mut state, &mut resolver, event)?;
                state.statistics.count(&record);
                self.emit_progress(ExtractionProgress::EventFinished(record.clone()));
                state.records.push(record);
            }

            state.statistics.commits_walked += 1;
            self.emit_progress(ExtractionProgress::CommitFinished {
                index,
                commit: commit.clone(),
                deletions: count,
            });
        }

        self.finish(run_id, state)
    }

    fn process_event(
        &self,
        state: &mut RunState,
        resolver: &mut BlobResolver,
        event: DeletionEvent,
    ) -> Result<EventRecord> {
        if let MatchMode::Patterns(patterns) = &self.config.match_mode {
            if !patterns.matches(&event.path) {
                return Ok(EventRecord {
                    event,
                    outcome: EventOutcome::FilteredOut,
                    strategy: None,
                });
            }
        }

        let resolved = match resolver.resolve(self.source, &event) {
            Ok(resolved) => resolved,
            Err(e) if !e.is_per_event() => return Err(e),
            Err(e) => {
                tracing::warn!("{} {}: {}", event.commit.short(), event.path, e);
                if self.config.failure_policy.aborts_on_resolve() {
                    return Err(GitTrashError::Aborted {
                        reason: e.to_string(),
                    });
                }
                return Ok(EventRecord {
                    event,
                    outcome: EventOutcome::ResolveFailed(e.to_string()),
                    strategy: None,
                });
            }
        };
        let strategy = Some(resolved.strategy.to_string());

        let hash = calculate_hash(&resolved.bytes, self.config.hash_algorithm);
        if !state.dedup.record(&event.path, &hash) {
            tracing::debug!(
                "{} {}: content already recovered",
                event.commit.short(),
                event.path
            );
            return Ok(EventRecord {
                event,
                outcome: EventOutcome::Duplicate,
                strategy,
            });
        }

        let relative = claim_output_path(&mut state.output_names, &event);
        if let Err(e) = self.write_recovered(&relative, &resolved.bytes) {
            // Nothing reached disk, so a later identical deletion may retry
            state.dedup.forget(&event.path, &hash);
            state.output_names.remove(&relative);
            if !e.is_per_event() {
                return Err(e);
            }
            tracing::warn!("{} {}: {}", event.commit.short(), event.path, e);
            if self.config.failure_policy.aborts_on_write() {
                return Err(GitTrashError::Aborted {
                    reason: e.to_string(),
                });
            }
            return Ok(EventRecord {
                event,
                outcome: EventOutcome::WriteFailed(e.to_string()),
                strategy,
            });
        }

        tracing::debug!("{} {} -> {}", event.commit, event.path, relative.display());
        state.manifest.register(&event.path);
        state.statistics.bytes_written += resolved.bytes.len() as u64;
        state.hash_manifest.add_file(WrittenFile {
            path: event.path.clone(),
            commit: event.commit.clone(),
            parent: event.parent.clone(),
            hash,
            size: resolved.bytes.len() as u64,
            output: relative.clone(),
        });

        Ok(EventRecord {
            event,
            outcome: EventOutcome::Written(relative),
            strategy,
        })
    }

    fn write_recovered(&self, relative: &Path, bytes: &[u8]) -> Result<()> {
        let target = self.config.output_dir.join(relative);
        if let Some(dir) = target.parent() {
            std::fs::create_dir_all(dir).map_err(|source| GitTrashError::Write {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&target, bytes).map_err(|source| GitTrashError::Write {
            path: target.clone(),
            source,
        })
    }

    fn finish(&self, run_id: String, state: RunState) -> Result<ExtractionResult> {
        let summary = RunSummary::from_manifest(&state.manifest);
        let output_dir = &self.config.output_dir;

        let mut manifest_path = None;
        let mut hash_manifest_path = None;
        if !state.manifest.is_empty() {
            let path = state.manifest.write_to(output_dir).map_err(|source| {
                GitTrashError::Write {
                    path: output_dir.clone(),
                    source,
                }
            })?;
            manifest_path = Some(path);

            if self.config.write_hash_manifest {
                let path = state
                    .hash_manifest
                    .export_json(output_dir)
                    .map_err(|source| GitTrashError::Write {
                        path: output_dir.clone(),
                        source,
                    })?;
                hash_manifest_path = Some(path);
            }
        }

        let statistics = state.statistics;
        tracing::info!(
            "Extraction complete: {} commits, {} deletions, {} found, {} written, {} failed",
            statistics.commits_walked,
            statistics.deletion_events,
            statistics.files_found(),
            statistics.written,
            statistics.resolve_failures + statistics.write_failures
        );

        Ok(ExtractionResult {
            run_id,
            records: state.records,
            manifest: state.manifest,
            written: state.hash_manifest.files,
            statistics,
            summary,
            manifest_path,
            hash_manifest_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailurePolicy;
    use crate::patterns::PatternSet;
    use crate::source::MemoryRepository;
    use std::cell::RefCell;
    use tempfile::TempDir;

    fn pem_history() -> (MemoryRepository, CommitId, CommitId) {
        let mut repo = MemoryRepository::new();
        let a = repo.commit(
            &[],
            &[("server.pem", "SERVER"), ("old.pem", "OLD"), ("readme.md", "1")],
        );
        let b = repo.commit(&[&a], &[("old.pem", "OLD"), ("readme.md", "1")]);
        let c = repo.commit(&[&b], &[("readme.md", "2")]);
        repo.set_ref("refs/heads/main", &c);
        (repo, b, c)
    }

    #[test]
    fn test_flatten_path() {
        assert_eq!(flatten_path("config/prod/.env"), "config_prod_.env");
        assert_eq!(flatten_path("server.pem"), "server.pem");
    }

    #[test]
    fn test_claim_output_path_never_reuses_a_name() {
        let commit = CommitId::new("aaaaaaaa11111111111111111111111111111111");
        let event = |parent: &str, path: &str| DeletionEvent {
            commit: commit.clone(),
            parent: CommitId::new(parent),
            path: path.to_string(),
            blob: None,
        };
        let left = event("bbbbbbbb22222222222222222222222222222222", "secret.pem");
        let right = event("cccccccc33333333333333333333333333333333", "secret.pem");
        let mut used = HashSet::new();

        assert_eq!(
            claim_output_path(&mut used, &left),
            PathBuf::from("aaaaaaaa/secret.pem")
        );
        assert_eq!(
            claim_output_path(&mut used, &right),
            PathBuf::from("aaaaaaaa/secret.pem~cccccccc")
        );
        assert_eq!(
            claim_output_path(&mut used, &right),
            PathBuf::from("aaaaaaaa/secret.pem~cccccccc-1")
        );
        assert_eq!(
            claim_output_path(&mut used, &right),
            PathBuf::from("aaaaaaaa/secret.pem~cccccccc-2")
        );
        assert_eq!(used.len(), 4);
    }

    #[test]
    fn test_outcomes_per_event() {
        let (repo, b, c) = pem_history();
        let temp_dir = TempDir::new().unwrap();
        let config = ExtractionConfig::with_patterns(
            temp_dir.path(),
            PatternSet::compile(["server*"]),
        );

        let result = ExtractionEngine::new(&repo, config).run().unwrap();

        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].event.commit, b);
        assert_eq!(
            result.records[0].outcome,
            EventOutcome::Written(PathBuf::from(b.short()).join("server.pem"))
        );
        assert_eq!(result.records[1].event.commit, c);
        assert_eq!(result.records[1].outcome, EventOutcome::FilteredOut);
        assert_eq!(result.statistics.filtered_out, 1);
        assert_eq!(result.statistics.files_found(), 1);
    }

    #[test]
    fn test_nothing_matched_writes_no_manifest() {
        let (repo, _, _) = pem_history();
        let temp_dir = TempDir::new().unwrap();
        let config =
            ExtractionConfig::with_patterns(temp_dir.path(), PatternSet::compile(["*.key"]));

        let result = ExtractionEngine::new(&repo, config).run().unwrap();

        assert_eq!(result.summary, RunSummary::Empty);
        assert!(result.manifest_path.is_none());
        assert!(!temp_dir.path().join("gittrash.log").exists());
        assert!(!temp_dir.path().join("gittrash.json").exists());
    }

    #[test]
    fn test_progress_callback_sees_every_commit() {
        let (repo, _, _) = pem_history();
        let temp_dir = TempDir::new().unwrap();
        let seen = RefCell::new(Vec::new());

        let mut engine =
            ExtractionEngine::new(&repo, ExtractionConfig::match_all(temp_dir.path()));
        engine.set_progress_callback(|progress| {
            let label = match progress {
                ExtractionProgress::WalkStarted { total_commits } => {
                    format!("start {}", total_commits)
                }
                ExtractionProgress::EventFinished(record) => {
                    format!("event {}", record.event.path)
                }
                ExtractionProgress::CommitFinished {
                    index, deletions, ..
                } => format!("commit {} {}", index, deletions),
            };
            seen.borrow_mut().push(label);
        });
        engine.run().unwrap();
        drop(engine);

        assert_eq!(
            seen.into_inner(),
            vec![
                "start 3",
                "commit 0 0",
                "event server.pem",
                "commit 1 1",
                "event old.pem",
                "commit 2 1",
            ]
        );
    }

    #[test]
    fn test_write_failure_is_recorded_and_run_continues() {
        let (repo, b, _) = pem_history();
        let temp_dir = TempDir::new().unwrap();
        // A regular file where commit B's directory should go
        std::fs::write(temp_dir.path().join(b.short()), "blocker").unwrap();

        let result = ExtractionEngine::new(&repo, ExtractionConfig::match_all(temp_dir.path()))
            .run()
            .unwrap();

        assert!(matches!(result.records[0].outcome, EventOutcome::WriteFailed(_)));
        assert!(matches!(result.records[1].outcome, EventOutcome::Written(_)));
        assert_eq!(result.statistics.write_failures, 1);
        assert_eq!(
            result.records.iter().filter(|r| r.outcome.is_failure()).count(),
            1
        );
        assert_eq!(result.manifest.paths(), &["old.pem"]);
    }

    #[test]
    fn test_strict_writes_aborts() {
        let (repo, b, _) = pem_history();
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(b.short()), "blocker").unwrap();

        let mut config = ExtractionConfig::match_all(temp_dir.path());
        config.failure_policy = FailurePolicy::StrictWrites;

        let err = ExtractionEngine::new(&repo, config).run().unwrap_err();
        assert!(matches!(err, GitTrashError::Aborted { .. }));
    }

    #[test]
    fn test_strict_aborts_on_resolve_failure() {
        let (mut repo, _, _) = pem_history();
        repo.remove_blob(&MemoryRepository::blob_id(b"SERVER"));
        let temp_dir = TempDir::new().unwrap();

        let mut config = ExtractionConfig::match_all(temp_dir.path());
        config.failure_policy = FailurePolicy::Strict;
        assert!(matches!(
            ExtractionEngine::new(&repo, config).run(),
            Err(GitTrashError::Aborted { .. })
        ));

        // StrictWrites only cares about writes
        let mut config = ExtractionConfig::match_all(temp_dir.path());
        config.failure_policy = FailurePolicy::StrictWrites;
        let result = ExtractionEngine::new(&repo, config).run().unwrap();
        assert_eq!(result.statistics.resolve_failures, 1);
        assert_eq!(result.statistics.written, 1);
    }

    #[test]
    fn test_hash_manifest_written() {
        let (repo, _, _) = pem_history();
        let temp_dir = TempDir::new().unwrap();

        let mut engine =
            ExtractionEngine::new(&repo, ExtractionConfig::match_all(temp_dir.path()));
        engine.set_repository_path("/srv/repo");
        let result = engine.run().unwrap();

        let path = result.hash_manifest_path.unwrap();
        let manifest = HashManifest::import_json(path).unwrap();
        assert_eq!(manifest.run_id, result.run_id);
        assert_eq!(manifest.repository, Some(PathBuf::from("/srv/repo")));
        assert_eq!(manifest.files.len(), 2);
        assert_eq!(manifest.files[0].path, "server.pem");
        assert_eq!(manifest.files[0].size, 6);
    }
}
