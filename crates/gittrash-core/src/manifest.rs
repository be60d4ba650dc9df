/// Run manifests: the plain path list and the JSON hash manifest
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use crate::hashing::HashAlgorithm;
use crate::source::CommitId;

/// Fixed name of the path manifest in the output root
pub const MANIFEST_FILE: &str = "gittrash.log";

/// Fixed name of the hash manifest in the output root
pub const HASH_MANIFEST_FILE: &str = "gittrash.json";

/// Distinct logical paths in first-recovered order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    paths: Vec<String>,
    index: HashSet<String>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path; returns false if it was already listed
    pub fn register(&mut self, path: &str) -> bool {
        if self.index.insert(path.to_string()) {
            self.paths.push(path.to_string());
            true
        } else {
            false
        }
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// One path per line, newline terminated
    pub fn render(&self) -> String {
        let mut out = String::new();
        for path in &self.paths {
            out.push_str(path);
            out.push('\n');
        }
        out
    }

    /// Write `gittrash.log` into `output_dir`
    pub fn write_to(&self, output_dir: &Path) -> io::Result<PathBuf> {
        let path = output_dir.join(MANIFEST_FILE);
        std::fs::write(&path, self.render())?;
        Ok(path)
    }
}

/// One file written to disk during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrittenFile {
    /// Logical path before deletion
    pub path: String,
    pub commit: CommitId,
    pub parent: CommitId,
    pub hash: String,
    pub size: u64,
    /// Location relative to the output root
    pub output: PathBuf,
}

/// Forensic record of every written file and its content hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashManifest {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub algorithm: HashAlgorithm,
    pub repository: Option<PathBuf>,
    pub files: Vec<WrittenFile>,
}

impl HashManifest {
    pub fn new(run_id: impl Into<String>, algorithm: HashAlgorithm) -> Self {
        Self {
            run_id: run_id.into(),
            created_at: Utc::now(),
            algorithm,
            repository: None,
            files: Vec::new(),
        }
    }

    pub fn add_file(&mut self, file: WrittenFile) {
        self.files.push(file);
    }

    /// Export to `gittrash.json` in `output_dir`
    pub fn export_json(&self, output_dir: &Path) -> io::Result<PathBuf> {
        let path = output_dir.join(HASH_MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    pub fn import_json(path: impl AsRef<Path>) -> io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
