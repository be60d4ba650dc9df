/// Extraction run configuration
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::hashing::HashAlgorithm;
use crate::patterns::PatternSet;
use crate::resolver::ResolveMode;
use crate::source::WalkOptions;

pub const DEFAULT_OUTPUT_DIR: &str = "extracted";

/// Pattern file used when none is given explicitly
pub const DEFAULT_PATTERN_FILE: &str = ".gitignore";

/// `<repository>/.gitignore`
pub fn default_pattern_file(repository: &Path) -> PathBuf {
    repository.join(DEFAULT_PATTERN_FILE)
}

/// Which deletions are candidates for extraction
#[derive(Debug, Clone)]
pub enum MatchMode {
    /// Every deleted file, patterns are not consulted
    All,
    Patterns(PatternSet),
}

/// What a per-event failure does to the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Skip the event and continue
    #[default]
    Tolerant,
    /// Write failures abort; resolve failures are skipped
    StrictWrites,
    /// Any per-event failure aborts
    Strict,
}

impl FailurePolicy {
    pub fn aborts_on_resolve(&self) -> bool {
        matches!(self, FailurePolicy::Strict)
    }

    pub fn aborts_on_write(&self) -> bool {
        matches!(self, FailurePolicy::StrictWrites | FailurePolicy::Strict)
    }
}

#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub output_dir: PathBuf,
    pub match_mode: MatchMode,
    /// Algorithm for the dedup key and hash manifest
    pub hash_algorithm: HashAlgorithm,
    pub resolve_mode: ResolveMode,
    pub failure_policy: FailurePolicy,
    /// Export `gittrash.json` next to the manifest
    pub write_hash_manifest: bool,
    pub walk: WalkOptions,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            match_mode: MatchMode::Patterns(PatternSet::default()),
            hash_algorithm: HashAlgorithm::Sha256,
            resolve_mode: ResolveMode::Auto,
            failure_policy: FailurePolicy::Tolerant,
            write_hash_manifest: true,
            walk: WalkOptions::default(),
        }
    }
}

impl ExtractionConfig {
    /// Config filtering deletions through `patterns`
    pub fn with_patterns(output_dir: impl Into<PathBuf>, patterns: PatternSet) -> Self {
        Self {
            output_dir: output_dir.into(),
            match_mode: MatchMode::Patterns(patterns),
            ..Default::default()
        }
    }

    /// Config recovering every deleted file
    pub fn match_all(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            match_mode: MatchMode::All,
            ..Default::default()
        }
    }
}
