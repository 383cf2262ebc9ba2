//! Loads one directory's listing, build file and configuration.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use buildwalk_buildfile::{BuildFile, ParseError};
use tracing::{debug, warn};

use super::cache::DirCache;
use super::config::WalkConfig;
use crate::relpath;

/// Everything known about one directory.
///
/// Lists never carry spare capacity, so callers that copy and extend them
/// never share storage with the cache.
#[derive(Debug, Clone)]
pub struct DirInfo {
    pub subdirs: Vec<String>,
    pub regular_files: Vec<String>,
    pub gen_files: Vec<String>,
    pub build_file: Option<BuildFile>,
    pub config: Arc<WalkConfig>,
}

/// Result of loading a directory: the info plus any error met on the way.
///
/// The info is usable even when `error` is set.
#[derive(Debug, Clone)]
pub struct DirLoad {
    pub info: Arc<DirInfo>,
    pub error: Option<LoadError>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    #[error("reading directory {}: {}", .path.display(), .source)]
    ReadDir {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("reading build file {}: {}", .path.display(), .source)]
    ReadBuildFile {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{}", join_errors(.0))]
    Multiple(Vec<LoadError>),
}

fn join_errors(errors: &[LoadError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Dir,
    File,
    Symlink,
}

#[derive(Debug)]
struct Entry {
    name: String,
    kind: EntryKind,
}

/// Produces [`DirLoad`]s for the cache.
#[derive(Debug)]
pub struct Loader {
    repo_root: PathBuf,
    read_root: Option<PathBuf>,
    directive_prefix: String,
    root_config: Arc<WalkConfig>,
}

impl Loader {
    /// `read_root`, when set, is a tree mirroring the repository that build
    /// files are read from instead of the source tree.
    pub fn new(
        repo_root: PathBuf,
        read_root: Option<PathBuf>,
        directive_prefix: String,
        root_config: WalkConfig,
    ) -> Self {
        Self {
            repo_root,
            read_root,
            directive_prefix,
            root_config: Arc::new(root_config),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Load `rel`. Its parent must already be loaded in `cache`.
    pub fn load(&self, cache: &DirCache, rel: &str) -> DirLoad {
        debug!(rel, "loading directory");
        let dir = relpath::to_abs(&self.repo_root, rel);
        let mut errors = Vec::new();

        let entries = match list_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                errors.push(LoadError::ReadDir {
                    path: dir.clone(),
                    source: Arc::new(e),
                });
                Vec::new()
            }
        };

        let parent_config = match relpath::parent(rel) {
            None => Arc::clone(&self.root_config),
            Some(parent) => Arc::clone(&cache.get_loaded(parent).info.config),
        };

        let build_file = match self.load_build_file(rel, &entries, &parent_config) {
            Ok(file) => file,
            Err(e) => {
                errors.push(e);
                None
            }
        };

        let config = Arc::new(parent_config.derive(rel, build_file.as_ref()));

        let mut subdirs = Vec::new();
        let mut regular_files = Vec::new();
        if !config.is_excluded(rel) {
            for entry in &entries {
                let entry_rel = relpath::join(rel, &entry.name);
                if config.is_excluded(&entry_rel) {
                    continue;
                }
                let kind = match entry.kind {
                    EntryKind::Symlink if config.should_follow(&entry_rel) => {
                        resolve_symlink(&dir.join(&entry.name))
                    }
                    kind => kind,
                };
                match kind {
                    EntryKind::Dir => subdirs.push(entry.name.clone()),
                    _ => regular_files.push(entry.name.clone()),
                }
            }
        }

        let mut gen_files: Vec<String> = build_file
            .as_ref()
            .map(|f| {
                f.generated_outputs()
                    .into_iter()
                    .filter(|out| !config.is_excluded(&relpath::join(rel, out)))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        subdirs.shrink_to_fit();
        regular_files.shrink_to_fit();
        gen_files.shrink_to_fit();

        let error = match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(LoadError::Multiple(errors)),
        };

        DirLoad {
            info: Arc::new(DirInfo {
                subdirs,
                regular_files,
                gen_files,
                build_file,
                config,
            }),
            error,
        }
    }

    fn load_build_file(
        &self,
        rel: &str,
        entries: &[Entry],
        parent_config: &WalkConfig,
    ) -> Result<Option<BuildFile>, LoadError> {
        let read_dir = match &self.read_root {
            Some(root) => relpath::to_abs(root, rel),
            None => relpath::to_abs(&self.repo_root, rel),
        };

        let shadow_entries;
        let entries = if self.read_root.is_some() {
            shadow_entries = match list_dir(&read_dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => {
                    return Err(LoadError::ReadDir {
                        path: read_dir,
                        source: Arc::new(e),
                    })
                }
            };
            &shadow_entries[..]
        } else {
            entries
        };

        let name = parent_config.build_file_names.iter().find(|name| {
            entries
                .iter()
                .any(|e| &e.name == *name && e.kind != EntryKind::Dir)
        });
        let name = match name {
            Some(name) => name,
            None => return Ok(None),
        };

        let path = read_dir.join(name);
        let bytes = fs::read(&path).map_err(|e| LoadError::ReadBuildFile {
            path: path.clone(),
            source: Arc::new(e),
        })?;
        let file = BuildFile::parse(&path, rel, &bytes, &self.directive_prefix)?;
        Ok(Some(file))
    }
}

/// Directory entries sorted by name. Names that are not UTF-8 are skipped.
fn list_dir(dir: &Path) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let Some(entry) = entry_or_skip(dir, entry) else {
            continue;
        };
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                warn!("{}: skipping non UTF-8 entry {:?}", dir.display(), raw);
                continue;
            }
        };
        let Some(file_type) = entry_or_skip(dir, entry.file_type()) else {
            continue;
        };
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        };
        entries.push(Entry { name, kind });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// A single unreadable entry, e.g. one removed mid-listing, is logged and
/// dropped; the rest of the listing survives.
fn entry_or_skip<T>(dir: &Path, result: io::Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{}: skipping unreadable entry: {}", dir.display(), e);
            None
        }
    }
}

fn resolve_symlink(path: &Path) -> EntryKind {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => EntryKind::Dir,
        Ok(_) => EntryKind::File,
        Err(e) => {
            warn!("{}: cannot follow symlink: {}", path.display(), e);
            EntryKind::Symlink
        }
    }
}
