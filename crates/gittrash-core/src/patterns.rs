//! Ignore-style pattern loading and matching.
//!
//! Patterns are a deliberately loose rendition of gitignore globbing:
//! `*` crosses path separators, `?` matches one character, and matching is
//! anchored at the start of the path only. `secret` therefore matches both
//! `secret.txt` and `secrets_dump`. Forensic recall matters more here than
//! precision.

use regex::Regex;
use std::path::Path;

use crate::error::{GitTrashError, Result};

/// A single compiled pattern
#[derive(Debug, Clone)]
pub struct Pattern {
    /// The sanitized source line
    pub source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile one glob into a prefix-anchored matcher
    pub fn compile(glob: &str) -> Result<Self> {
        let regex = Regex::new(&glob_to_regex(glob)).map_err(|e| {
            GitTrashError::Config(format!("Invalid pattern '{}': {}", glob, e))
        })?;

        Ok(Self {
            source: glob.to_string(),
            regex,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

/// Translate a glob into a regex anchored at the start of the input only
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::with_capacity(glob.len() * 2 + 1);
    out.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    out
}

/// Strip blank lines, `#` comments and `!` negations
///
/// Negations are dropped rather than inverted.
pub fn sanitize_lines<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| {
            let line = line.as_ref().trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                None
            } else {
                Some(line.to_string())
            }
        })
        .collect()
}

/// A set of patterns; a path matches when any pattern matches
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    /// Sanitize raw pattern-file lines and compile what remains
    pub fn compile<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns = Vec::new();
        for line in sanitize_lines(lines) {
            match Pattern::compile(&line) {
                Ok(pattern) => patterns.push(pattern),
                Err(e) => tracing::warn!("Skipping pattern: {}", e),
            }
        }
        Self { patterns }
    }

    /// Read and compile a pattern file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GitTrashError::Config(format!(
                "Cannot read pattern file {}: {}",
                path.display(),
                e
            ))
        })?;

        let set = Self::compile(content.lines());
        tracing::info!(
            "Loaded {} patterns from {}",
            set.len(),
            path.display()
        );
        Ok(set)
    }

    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.source.as_str())
    }
}
