use std::collections::{HashMap, HashSet};

/// Tracks which content hashes have been recovered for each logical path
///
/// A (path, hash) pair is novel exactly once per run. One path may carry
/// several hashes when different commits deleted different content there.
#[derive(Debug, Default, Clone)]
pub struct ContentDeduplicator {
    records: HashMap<String, HashSet<String>>,
}

impl ContentDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any content has been recorded for `path`
    pub fn seen(&self, path: &str) -> bool {
        self.records.contains_key(path)
    }

    /// Record a (path, hash) pair, returning true if it was not seen before
    pub fn record(&mut self, path: &str, hash: &str) -> bool {
        match self.records.get_mut(path) {
            Some(hashes) => hashes.insert(hash.to_string()),
            None => {
                let mut hashes = HashSet::new();
                hashes.insert(hash.to_string());
                self.records.insert(path.to_string(), hashes);
                true
            }
        }
    }

    /// Undo a `record`, used when the content never reached disk
    pub fn forget(&mut self, path: &str, hash: &str) {
        if let Some(hashes) = self.records.get_mut(path) {
            hashes.remove(hash);
            if hashes.is_empty() {
                self.records.remove(path);
            }
        }
    }

    pub fn hashes_for(&self, path: &str) -> Option<&HashSet<String>> {
        self.records.get(path)
    }

    /// Number of distinct logical paths
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total distinct (path, hash) pairs
    pub fn total_versions(&self) -> usize {
        self.records.values().map(HashSet::len).sum()
    }
}
