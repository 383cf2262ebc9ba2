//! Built-in walk defaults (layer 1)
//!
//! Hardcoded defaults for every root setting.

use toml::{Table, Value};

/// Build file names recognised when no `build_file_names` setting is given.
pub const DEFAULT_BUILD_FILE_NAMES: &[&str] = &["BUILD.bazel", "BUILD"];

/// Built-in default configuration values
#[derive(Debug, Clone)]
pub struct BuiltinDefaults {
    /// Build file names, in preference order
    pub build_file_names: Vec<String>,

    /// Prefix of directive comments (default: "gazelle")
    pub directive_prefix: String,

    /// Abort on errors instead of logging and continuing (default: false)
    pub strict: bool,

    /// Warm the directory cache in parallel before walking (default: true)
    pub prefetch: bool,

    /// Prefetch worker threads (default: 6)
    pub prefetch_workers: usize,

    /// Repo-root file listing paths to ignore (default: ".bazelignore")
    pub ignore_file: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            build_file_names: DEFAULT_BUILD_FILE_NAMES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            directive_prefix: buildwalk_buildfile::DEFAULT_DIRECTIVE_PREFIX.to_string(),
            strict: false,
            prefetch: true,
            prefetch_workers: 6,
            ignore_file: ".bazelignore".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to a TOML table for merging
    pub fn to_table(&self) -> Table {
        let mut walk = Table::new();
        walk.insert(
            "build_file_names".to_string(),
            Value::Array(
                self.build_file_names
                    .iter()
                    .cloned()
                    .map(Value::String)
                    .collect(),
            ),
        );
        walk.insert(
            "directive_prefix".to_string(),
            Value::String(self.directive_prefix.clone()),
        );
        walk.insert("strict".to_string(), Value::Boolean(self.strict));
        walk.insert(
            "ignore_file".to_string(),
            Value::String(self.ignore_file.clone()),
        );

        let mut prefetch = Table::new();
        prefetch.insert("enabled".to_string(), Value::Boolean(self.prefetch));
        prefetch.insert(
            "workers".to_string(),
            Value::Integer(self.prefetch_workers as i64),
        );

        let mut table = Table::new();
        table.insert("walk".to_string(), Value::Table(walk));
        table.insert("prefetch".to_string(), Value::Table(prefetch));
        table
    }
}
