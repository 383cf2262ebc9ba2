//! Walk settings inherited down the tree
//!
//! Each directory's [`WalkConfig`] is its parent's with the directory's own
//! directives applied:
//!
//! - `exclude <glob>`: skip matching files and directories. Patterns are
//!   relative to the directory declaring them; `.` excludes the directory
//!   itself.
//! - `follow <glob>`: resolve matching symlinks to their targets.
//! - `ignore`: do not update this directory's build file. Not inherited.
//! - `build_file_name a,b`: build file names for this directory and below.
//! - `generation_mode update_only|create_and_update`: with `update_only`,
//!   directories without a build file are merged into the nearest ancestor
//!   that has one.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use buildwalk_buildfile::BuildFile;
use globset::{GlobBuilder, GlobMatcher};
use tracing::warn;

use crate::config::{ConfigError, Settings};
use crate::ignore::IgnoreList;
use crate::relpath;

/// Directive keys handled by the walker itself.
pub const WALK_DIRECTIVES: &[&str] = &[
    "exclude",
    "follow",
    "ignore",
    "build_file_name",
    "generation_mode",
];

const GLOB_CHARS: &[char] = &['*', '?', '[', '{'];

/// How build files are produced for directories that lack one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationMode {
    /// Create build files where missing and update existing ones.
    #[default]
    CreateAndUpdate,
    /// Only update existing build files; directories without one belong to
    /// the nearest ancestor that has one.
    UpdateOnly,
}

impl FromStr for GenerationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_and_update" => Ok(GenerationMode::CreateAndUpdate),
            "update_only" => Ok(GenerationMode::UpdateOnly),
            other => Err(format!(
                "unknown generation mode {:?}: want \"create_and_update\" or \"update_only\"",
                other
            )),
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationMode::CreateAndUpdate => f.write_str("create_and_update"),
            GenerationMode::UpdateOnly => f.write_str("update_only"),
        }
    }
}

/// A repo-relative path pattern.
///
/// `*` does not cross `/`; `**` matches any number of components. Patterns
/// without glob characters match exactly.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    matcher: Option<GlobMatcher>,
}

impl PathPattern {
    pub fn new(raw: &str) -> Result<Self, globset::Error> {
        let matcher = if raw.contains(GLOB_CHARS) {
            Some(
                GlobBuilder::new(raw)
                    .literal_separator(true)
                    .build()?
                    .compile_matcher(),
            )
        } else {
            None
        };
        Ok(Self {
            raw: raw.to_string(),
            matcher,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_match(&self, rel: &str) -> bool {
        match &self.matcher {
            Some(m) => m.is_match(rel),
            None => self.raw == rel,
        }
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

/// Per-directory walk settings.
///
/// Pattern lists are shared between a directory and its descendants until
/// one of them adds a pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkConfig {
    pub excludes: Arc<Vec<PathPattern>>,
    pub follow: Arc<Vec<PathPattern>>,
    pub ignore: bool,
    pub build_file_names: Arc<Vec<String>>,
    pub generation_mode: GenerationMode,
    pub ignored: Arc<IgnoreList>,
}

impl WalkConfig {
    /// Configuration the repository root's directives are applied to.
    pub fn root(settings: &Settings) -> Result<Self, ConfigError> {
        let ignored = IgnoreList::load(&settings.repo_root, &settings.ignore_file).map_err(|e| {
            ConfigError::IoError(format!("{}: {}", settings.ignore_file, e))
        })?;
        Ok(Self::with_ignore_list(settings, ignored))
    }

    pub fn with_ignore_list(settings: &Settings, ignored: IgnoreList) -> Self {
        Self {
            excludes: Arc::new(Vec::new()),
            follow: Arc::new(Vec::new()),
            ignore: false,
            build_file_names: Arc::new(settings.build_file_names.clone()),
            generation_mode: GenerationMode::default(),
            ignored: Arc::new(ignored),
        }
    }

    /// Configuration for the directory `rel`, whose parent this is.
    pub fn derive(&self, rel: &str, file: Option<&BuildFile>) -> Self {
        let mut wc = self.clone();
        wc.ignore = false;

        let file = match file {
            Some(f) => f,
            None => return wc,
        };

        for d in &file.directives {
            match d.key.as_str() {
                "exclude" => {
                    if let Some(p) = compile_pattern(rel, &d.value, "exclude", file) {
                        Arc::make_mut(&mut wc.excludes).push(p);
                    }
                }
                "follow" => {
                    if let Some(p) = compile_pattern(rel, &d.value, "follow", file) {
                        Arc::make_mut(&mut wc.follow).push(p);
                    }
                }
                "ignore" => {
                    if !d.value.is_empty() {
                        warn!(
                            "{}: the ignore directive does not take arguments; did you mean exclude? ({:?})",
                            file.path.display(),
                            d.value
                        );
                    }
                    wc.ignore = true;
                }
                "build_file_name" => {
                    let names: Vec<String> = d
                        .value
                        .split(',')
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .map(str::to_string)
                        .collect();
                    if names.is_empty() {
                        warn!(
                            "{}: build_file_name directive needs at least one name",
                            file.path.display()
                        );
                    } else {
                        wc.build_file_names = Arc::new(names);
                    }
                }
                "generation_mode" => match d.value.parse() {
                    Ok(mode) => wc.generation_mode = mode,
                    Err(e) => warn!("{}: {}", file.path.display(), e),
                },
                _ => {}
            }
        }
        wc
    }

    /// Whether `rel` is excluded by a directive or the ignore list.
    pub fn is_excluded(&self, rel: &str) -> bool {
        self.ignored.contains(rel) || self.excludes.iter().any(|p| p.is_match(rel))
    }

    pub fn should_follow(&self, rel: &str) -> bool {
        self.follow.iter().any(|p| p.is_match(rel))
    }
}

fn compile_pattern(rel: &str, value: &str, key: &str, file: &BuildFile) -> Option<PathPattern> {
    if value.is_empty() {
        warn!("{}: {} directive needs a pattern", file.path.display(), key);
        return None;
    }
    let joined = relpath::join(rel, value);
    match PathPattern::new(&joined) {
        Ok(p) => Some(p),
        Err(e) => {
            warn!(
                "{}: the {} pattern is not valid {:?}: {}",
                file.path.display(),
                key,
                joined,
                e
            );
            None
        }
    }
}
