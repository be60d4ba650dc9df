use anyhow::{Context, Result};
use std::path::Path;

pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod hashing;
pub mod manifest;
pub mod patterns;
pub mod report;
pub mod resolver;
pub mod source;
pub mod walker;

// Re-export key extraction types
pub use config::{default_pattern_file, ExtractionConfig, FailurePolicy, MatchMode};
pub use dedup::ContentDeduplicator;
pub use engine::{
    EventOutcome, EventRecord, ExtractionEngine, ExtractionProgress, ExtractionResult,
    ExtractionStatistics,
};
pub use error::GitTrashError;
pub use hashing::HashAlgorithm;
pub use manifest::{HashManifest, Manifest, WrittenFile, HASH_MANIFEST_FILE, MANIFEST_FILE};
pub use patterns::PatternSet;
pub use report::{RecoveryReport, RunSummary};
pub use resolver::{BlobResolver, ResolveMode};
pub use source::{
    BlobId, ChangeKind, CommitId, GitRepository, HistorySource, MemoryRepository, WalkOptions,
};
pub use walker::{DeletionEvent, HistoryWalker};

/// Load the pattern file, defaulting to the repository's `.gitignore`
pub fn load_patterns(repository: &Path, pattern_file: Option<&Path>) -> Result<PatternSet> {
    let path = match pattern_file {
        Some(path) => path.to_path_buf(),
        None => default_pattern_file(repository),
    };
    PatternSet::load(&path)
        .with_context(|| format!("Failed to load patterns for {}", repository.display()))
}

/// Open a repository and run a full extraction over its history
pub fn extract_deleted_files(
    repository: &Path,
    config: ExtractionConfig,
) -> Result<ExtractionResult> {
    let repo = GitRepository::open(repository)?;

    tracing::info!(
        "Extracting deleted files from {} into {}",
        repository.display(),
        config.output_dir.display()
    );

    let mut engine = ExtractionEngine::new(&repo, config);
    engine.set_repository_path(repository);
    let result = engine.run()?;

    tracing::info!(
        "Recovered {} distinct files ({} found)",
        result.manifest.len(),
        result.statistics.files_found()
    );

    Ok(result)
}
