use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while walking history and extracting deleted files
#[derive(Error, Debug)]
pub enum GitTrashError {
    /// Invalid repository path, unreadable pattern file, unusable output root
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// Object missing from the store
    #[error("Object not found: {0}")]
    NotFound(String),

    /// No resolution strategy could locate the pre-deletion content
    #[error("Could not resolve {path} in parent {commit}: {}", attempts.join("; "))]
    Resolve {
        commit: String,
        path: String,
        attempts: Vec<String>,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Run stopped by the configured failure policy
    #[error("Extraction aborted: {reason}")]
    Aborted { reason: String },
}

impl GitTrashError {
    /// Whether the error is confined to a single deletion event
    pub fn is_per_event(&self) -> bool {
        matches!(
            self,
            GitTrashError::Resolve { .. } | GitTrashError::Write { .. } | GitTrashError::NotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, GitTrashError>;
