//! Layered root settings and per-directory configuration
//!
//! Root settings merge three layers:
//! 1. Built-in defaults
//! 2. Repo config (`.buildwalk.toml`)
//! 3. CLI flags
//!
//! Each visited directory gets its own [`Config`], cloned from its parent's
//! and then adjusted by every registered configurer.

mod defaults;
mod merge;
mod settings;

pub use defaults::{BuiltinDefaults, DEFAULT_BUILD_FILE_NAMES};
pub use merge::{merge_layers, merge_table};
pub use settings::{ConfigError, ConfigOrigin, ConfigSource, Settings, REPO_CONFIG_FILE};

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Configuration in effect for one directory.
///
/// Cloning is cheap: settings are shared and extension values are reference
/// counted. Replacing an extension value in a clone never affects the
/// directory it was cloned from.
#[derive(Clone)]
pub struct Config {
    settings: Arc<Settings>,
    exts: BTreeMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Config {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            exts: BTreeMap::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn repo_root(&self) -> &Path {
        &self.settings.repo_root
    }

    /// Extension value stored under `name`, if present and of type `T`.
    pub fn ext<T: Any + Send + Sync>(&self, name: &str) -> Option<&T> {
        self.exts.get(name)?.downcast_ref::<T>()
    }

    /// Store an extension value, replacing any previous one.
    pub fn set_ext<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.exts.insert(name.into(), Arc::new(value));
    }

    /// Clone of the extension value under `name`, or `T::default()`.
    ///
    /// Configurers read their parent's value with this, modify the copy and
    /// store it back with [`Config::set_ext`].
    pub fn ext_or_default<T: Any + Send + Sync + Clone + Default>(&self, name: &str) -> T {
        self.ext::<T>(name).cloned().unwrap_or_default()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("settings", &self.settings)
            .field("exts", &self.exts.keys().collect::<Vec<_>>())
            .finish()
    }
}
