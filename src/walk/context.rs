//! Handle to the directory cache of a walk, and the process-wide record of
//! the walk in progress.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use super::cache::DirCache;
use super::config::WalkConfig;
use super::loader::{DirInfo, DirLoad, LoadError, Loader};
use super::WalkError;
use crate::config::{ConfigError, Settings};
use crate::relpath;

/// Shared access to the directory cache of one walk.
///
/// Cloning is cheap; all clones share the same cache.
#[derive(Debug, Clone)]
pub struct WalkContext {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    cache: DirCache,
    loader: Loader,
}

impl WalkContext {
    /// Context for `settings`, reading the repository ignore file.
    pub fn new(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self::with_root_config(settings, WalkConfig::root(settings)?))
    }

    pub fn with_root_config(settings: &Settings, root_config: WalkConfig) -> Self {
        let loader = Loader::new(
            settings.repo_root.clone(),
            settings.read_build_files_dir.clone(),
            settings.directive_prefix.clone(),
            root_config,
        );
        Self {
            inner: Arc::new(ContextInner {
                cache: DirCache::new(),
                loader,
            }),
        }
    }

    pub fn repo_root(&self) -> &Path {
        self.inner.loader.repo_root()
    }

    /// Cached load of `rel`. The parent of `rel` must already be loaded.
    pub(crate) fn load(&self, rel: &str) -> DirLoad {
        let inner = &*self.inner;
        inner.cache.get(rel, |rel| inner.loader.load(&inner.cache, rel))
    }

    /// Info for `rel`, loading it and its ancestors if needed.
    pub fn dir_info(&self, rel: &str) -> Result<Arc<DirInfo>, LoadError> {
        let rel = relpath::clean(rel);
        for ancestor in relpath::ancestors(&rel) {
            self.load(ancestor);
        }
        let loaded = self.load(&rel);
        match loaded.error {
            Some(e) => Err(e),
            None => Ok(loaded.info),
        }
    }

    pub fn cached_dirs(&self) -> usize {
        self.inner.cache.len()
    }
}

static ACTIVE: Mutex<Option<WalkContext>> = parking_lot::const_mutex(None);

/// Registration of the walk in progress. Only one walk may be active per
/// process; the registration is released when the guard drops.
#[derive(Debug)]
pub struct ActiveWalk {
    _private: (),
}

impl ActiveWalk {
    /// # Panics
    ///
    /// Panics if another walk is already active.
    pub fn register(ctx: &WalkContext) -> Self {
        let mut active = ACTIVE.lock();
        if active.is_some() {
            drop(active);
            panic!("a walk is already in progress; only one walk may run at a time");
        }
        *active = Some(ctx.clone());
        Self { _private: () }
    }
}

impl Drop for ActiveWalk {
    fn drop(&mut self) {
        ACTIVE.lock().take();
    }
}

/// Info for `rel` from the walk currently in progress.
pub fn current_dir_info(rel: &str) -> Result<Arc<DirInfo>, WalkError> {
    let ctx = ACTIVE.lock().clone().ok_or(WalkError::NoActiveWalk)?;
    Ok(ctx.dir_info(rel)?)
}

/// Serializes tests that start walks.
#[cfg(test)]
pub(crate) static TEST_WALK_LOCK: Mutex<()> = parking_lot::const_mutex(());
