//! Slash-separated, repository-relative paths.
//!
//! The repository root is the empty string. Paths never start or end with
//! `/` and contain no `.` components.

use std::path::{Component, Path, PathBuf};

/// Join `name` onto `rel` and clean the result.
pub fn join(rel: &str, name: &str) -> String {
    if rel.is_empty() {
        clean(name)
    } else if name.is_empty() {
        clean(rel)
    } else {
        clean(&format!("{}/{}", rel, name))
    }
}

/// Resolve `.` and `..` components and drop empty ones.
///
/// `..` at the top is dropped, so the result never escapes the root.
pub fn clean(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    parts.join("/")
}

/// Parent directory; `None` for the root.
pub fn parent(rel: &str) -> Option<&str> {
    if rel.is_empty() {
        return None;
    }
    Some(rel.rfind('/').map_or("", |i| &rel[..i]))
}

/// Every proper ancestor of `rel`, root first.
pub fn ancestors(rel: &str) -> Vec<&str> {
    let mut out = Vec::new();
    if rel.is_empty() {
        return out;
    }
    out.push("");
    for (i, c) in rel.char_indices() {
        if c == '/' {
            out.push(&rel[..i]);
        }
    }
    out
}

/// Absolute filesystem path of `rel` under `root`.
pub fn to_abs(root: &Path, rel: &str) -> PathBuf {
    if rel.is_empty() {
        root.to_path_buf()
    } else {
        root.join(rel)
    }
}

/// Convert `path` to a path relative to `root`.
///
/// Relative inputs are taken relative to `root`. Returns `None` when the
/// path lies outside `root` or is not valid UTF-8.
pub fn from_abs(root: &Path, path: &Path) -> Option<String> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };

    let root_parts = normalize(root)?;
    let parts = normalize(&joined)?;
    if parts.len() < root_parts.len() || parts[..root_parts.len()] != root_parts[..] {
        return None;
    }
    Some(parts[root_parts.len()..].join("/"))
}

fn normalize(path: &Path) -> Option<Vec<String>> {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => parts.push(p.as_os_str().to_str()?.to_string()),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(s) => parts.push(s.to_str()?.to_string()),
        }
    }
    Some(parts)
}
