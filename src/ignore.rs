//! Repository-wide ignore list (`.bazelignore`)
//!
//! One repo-relative path per line. Blank lines and `#` comments are
//! skipped. Entries are literal paths; glob patterns are not supported and
//! are dropped with a warning.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use tracing::warn;

use crate::relpath;

const GLOB_CHARS: &[char] = &['*', '?', '[', '{'];

/// Paths excluded from every walk regardless of directives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreList {
    paths: HashSet<String>,
}

impl IgnoreList {
    /// Load `file_name` from `repo_root`. A missing file yields an empty list.
    pub fn load(repo_root: &Path, file_name: &str) -> io::Result<Self> {
        let path = repo_root.join(file_name);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Self::parse(&contents, &path)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Parse ignore file contents. `source` is only used in log messages.
    pub fn parse(contents: &str, source: &Path) -> Self {
        let mut paths = HashSet::new();
        for (lineno, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.contains(GLOB_CHARS) {
                warn!(
                    "{}:{}: glob patterns are not supported, ignoring {:?}",
                    source.display(),
                    lineno + 1,
                    line
                );
                continue;
            }
            let rel = relpath::clean(line);
            if !rel.is_empty() {
                paths.insert(rel);
            }
        }
        Self { paths }
    }

    pub fn contains(&self, rel: &str) -> bool {
        self.paths.contains(rel)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_skips_comments_and_globs() {
        let list = IgnoreList::parse(
            "# generated\nbazel-out\n\n  node_modules/  \n./third_party/big\nfoo/*.go\nbar?\n",
            Path::new(".bazelignore"),
        );
        assert_eq!(list.len(), 3);
        assert!(list.contains("bazel-out"));
        assert!(list.contains("node_modules"));
        assert!(list.contains("third_party/big"));
        assert!(!list.contains("foo/*.go"));
        assert!(!list.contains("third_party"));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let list = IgnoreList::load(dir.path(), ".bazelignore").unwrap();
        assert!(list.is_empty());
    }

    #[test]
    fn test_load_from_repo_root() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".bazelignore"), "out\n").unwrap();
        let list = IgnoreList::load(dir.path(), ".bazelignore").unwrap();
        assert!(list.contains("out"));
    }
}
