//! Memoized directory loads shared by the walker and the prefetcher.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use super::loader::DirLoad;

/// Concurrent, insert-only map from repo-relative path to its [`DirLoad`].
///
/// The first caller for a path runs the loader; concurrent callers for the
/// same path block until it finishes and then see the same result. No map
/// lock is held while a loader runs. Entries live as long as the cache.
#[derive(Debug, Default)]
pub struct DirCache {
    entries: DashMap<String, Arc<OnceLock<DirLoad>>>,
}

impl DirCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached load of `rel`, running `load` if nobody has yet.
    pub fn get<F>(&self, rel: &str, load: F) -> DirLoad
    where
        F: FnOnce(&str) -> DirLoad,
    {
        let cell = Arc::clone(self.entries.entry(rel.to_string()).or_default().value());
        cell.get_or_init(|| load(rel)).clone()
    }

    /// Result of a load that has already completed.
    ///
    /// # Panics
    ///
    /// Panics if `rel` has not finished loading. Callers only use this for
    /// ancestors of a directory being loaded, which are always loaded first.
    pub fn get_loaded(&self, rel: &str) -> DirLoad {
        let loaded = self
            .entries
            .get(rel)
            .and_then(|cell| cell.value().get().cloned());
        match loaded {
            Some(loaded) => loaded,
            None => panic!("directory {:?} was requested before it was loaded", rel),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
