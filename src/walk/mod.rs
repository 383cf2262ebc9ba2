//! Directory walking with inherited per-directory configuration
//!
//! [`walk`] visits a repository tree in post-order. Each directory's
//! configuration is derived from its parent's and its own build file
//! directives; directory metadata is loaded once into a cache shared with
//! an optional parallel prefetch pass and with [`WalkContext::dir_info`]
//! lookups made during the walk.

mod cache;
mod config;
mod context;
mod loader;
mod prefetch;
mod walker;

pub use cache::DirCache;
pub use config::{GenerationMode, PathPattern, WalkConfig, WALK_DIRECTIVES};
pub use context::{current_dir_info, ActiveWalk, WalkContext};
pub use loader::{DirInfo, DirLoad, LoadError, Loader};
pub use prefetch::prefetch;
pub use walker::{Mode, UpdateFilter, WALK_CONFIG_EXT};

#[cfg(test)]
pub(crate) use context::TEST_WALK_LOCK;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use buildwalk_buildfile::BuildFile;
use tracing::{debug, info};

use crate::config::{Config, ConfigError};
use crate::extension::Configurer;
use crate::relpath;
use walker::Walker;

/// Error type returned by walk callbacks.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("{rel}: {source}")]
    Callback {
        rel: String,
        #[source]
        source: CallbackError,
    },

    #[error("{}: unknown directive {:?}", .path.display(), .key)]
    UnknownDirective { path: PathBuf, key: String },

    #[error("{} is not inside the repository root {}", .path.display(), .repo_root.display())]
    OutsideRepo { path: PathBuf, repo_root: PathBuf },

    #[error("no walk is in progress")]
    NoActiveWalk,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{}", join_errors(.0))]
    Multiple(Vec<WalkError>),
}

fn join_errors(errors: &[WalkError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl WalkError {
    /// The individual errors, flattening [`WalkError::Multiple`].
    pub fn errors(&self) -> Vec<&WalkError> {
        match self {
            WalkError::Multiple(errors) => errors.iter().flat_map(WalkError::errors).collect(),
            other => vec![other],
        }
    }
}

/// What the callback sees for one directory.
///
/// `subdirs` and `regular_files` include entries of contained
/// subdirectories (no build file of their own, `update_only` mode) as
/// paths relative to `dir`.
#[derive(Debug)]
pub struct WalkArgs<'a> {
    pub dir: &'a Path,
    pub rel: &'a str,
    pub config: &'a Config,
    /// Whether the callback may rewrite this directory's build file. False
    /// when the build file failed to load or carries an `ignore` directive.
    pub update: bool,
    pub build_file: Option<&'a BuildFile>,
    pub subdirs: &'a [String],
    pub regular_files: &'a [String],
    pub gen_files: &'a [String],
    pub context: &'a WalkContext,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkResponse {
    /// Additional repo-relative directories to visit after the main pass.
    pub rels_to_visit: Vec<String>,
}

/// Walk the repository at `config.repo_root()`.
///
/// `dirs` are the directories to update, absolute or relative to the
/// repository root; empty means the whole repository. Errors from loading
/// directories and from the callback are collected and returned together
/// once the walk finishes. In strict mode the walk stops visiting new
/// directories after the first error, and an unknown directive aborts it.
///
/// # Panics
///
/// Panics if another walk is in progress in this process.
pub fn walk<P, F>(
    config: &Config,
    configurers: &[&dyn Configurer],
    dirs: &[P],
    mode: Mode,
    callback: F,
) -> Result<(), WalkError>
where
    P: AsRef<Path>,
    F: FnMut(&WalkArgs<'_>) -> Result<WalkResponse, CallbackError>,
{
    let settings = config.settings();
    let repo_root = &settings.repo_root;

    let mut rels = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let dir = dir.as_ref();
        let rel = relpath::from_abs(repo_root, dir).ok_or_else(|| WalkError::OutsideRepo {
            path: dir.to_path_buf(),
            repo_root: repo_root.clone(),
        })?;
        rels.push(rel);
    }
    if rels.is_empty() {
        rels.push(String::new());
    }

    let ctx = WalkContext::new(settings)?;
    let _active = ActiveWalk::register(&ctx);
    info!(repo_root = %repo_root.display(), %mode, dirs = ?rels, "starting walk");

    if settings.prefetch {
        if let Some(roots) = mode.prefetch_roots(&rels) {
            prefetch(&ctx, &roots, settings.prefetch_workers);
        }
    }

    let filter = UpdateFilter::new(mode, &rels);
    let walker = Walker::new(&ctx, configurers, filter, settings.strict, callback);
    let mut errors = walker.run(config)?;
    debug!(dirs = ctx.cached_dirs(), errors = errors.len(), "walk finished");

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(WalkError::Multiple(errors)),
    }
}

/// Info for `rel` from the cache of `ctx`, loading it if needed.
pub fn get_dir_info(ctx: &WalkContext, rel: &str) -> Result<Arc<DirInfo>, LoadError> {
    ctx.dir_info(rel)
}
