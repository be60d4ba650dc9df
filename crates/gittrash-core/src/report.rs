/// End-of-run summary grouped by file extension
use serde::{Deserialize, Serialize};

use crate::manifest::Manifest;

/// Grouping key for a recovered path
///
/// The text after the last `.` of the file name. A hidden file such as
/// `.env` groups as `env`; a name without any dot groups as itself.
pub fn extension_of(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionGroup {
    pub extension: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Distinct logical paths recovered
    pub total_files: usize,
    /// Most populous first; ties keep first-encounter order
    pub groups: Vec<ExtensionGroup>,
}

impl RecoveryReport {
    pub fn from_paths<S: AsRef<str>>(paths: &[S]) -> Self {
        let mut groups: Vec<ExtensionGroup> = Vec::new();
        for path in paths {
            let extension = extension_of(path.as_ref());
            match groups.iter_mut().find(|g| g.extension == extension) {
                Some(group) => group.count += 1,
                None => groups.push(ExtensionGroup {
                    extension: extension.to_string(),
                    count: 1,
                }),
            }
        }
        // sort_by is stable
        groups.sort_by(|a, b| b.count.cmp(&a.count));

        Self {
            total_files: paths.len(),
            groups,
        }
    }

    pub fn from_manifest(manifest: &Manifest) -> Self {
        Self::from_paths(manifest.paths())
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "{} {} recovered\n",
            self.total_files,
            plural(self.total_files)
        );
        for group in &self.groups {
            out.push_str(&format!(
                "{} {}  {}\n",
                group.count,
                plural(group.count),
                group.extension.to_uppercase()
            ));
        }
        out
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        "file"
    } else {
        "files"
    }
}

/// Outcome of a complete run, as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunSummary {
    /// Nothing was written; no manifest exists
    Empty,
    Recovered(RecoveryReport),
}

impl RunSummary {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        if manifest.is_empty() {
            RunSummary::Empty
        } else {
            RunSummary::Recovered(RecoveryReport::from_manifest(manifest))
        }
    }

    pub fn render(&self) -> String {
        match self {
            RunSummary::Empty => "No files found.\n".to_string(),
            RunSummary::Recovered(report) => report.render(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_rules() {
        assert_eq!(extension_of("server.pem"), "pem");
        assert_eq!(extension_of("deploy/keys/prod.tar.gz"), "gz");
        assert_eq!(extension_of(".env"), "env");
        assert_eq!(extension_of("config/.env"), "env");
        assert_eq!(extension_of("config/.env.local"), "local");
        assert_eq!(extension_of("Makefile"), "Makefile");
        // dots in directory names are not extensions
        assert_eq!(extension_of("v1.2/id_rsa"), "id_rsa");
    }

    #[test]
    fn test_groups_sorted_by_count_stable() {
        let paths = [
            "a.key", "b.pem", "c.pem", "d.env", "e.key", "f.pem", "g.txt",
        ];
        let report = RecoveryReport::from_paths(&paths);

        let order: Vec<(&str, usize)> = report
            .groups
            .iter()
            .map(|g| (g.extension.as_str(), g.count))
            .collect();
        assert_eq!(
            order,
            vec![("pem", 3), ("key", 2), ("env", 1), ("txt", 1)]
        );
        assert_eq!(report.total_files, 7);
    }

    #[test]
    fn test_render() {
        let report = RecoveryReport::from_paths(&["server.pem", "old.pem"]);
        assert_eq!(report.render(), "2 files recovered\n2 files  PEM\n");

        let single = RecoveryReport::from_paths(&[".env"]);
        assert_eq!(single.render(), "1 file recovered\n1 file  ENV\n");
    }

    #[test]
    fn test_empty_summary() {
        let summary = RunSummary::from_manifest(&Manifest::new());
        assert_eq!(summary, RunSummary::Empty);
        assert_eq!(summary.render(), "No files found.\n");
    }
}
