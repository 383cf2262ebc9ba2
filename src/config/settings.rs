//! Root settings with provenance
//!
//! Settings are the process-wide configuration every directory's
//! [`Config`](super::Config) starts from. They are built by merging the
//! built-in defaults, the repo config file and CLI overrides, and record
//! which files contributed.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use toml::Table;

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;

/// Repo config file name, relative to the repository root.
pub const REPO_CONFIG_FILE: &str = ".buildwalk.toml";

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    Repo,
    Cli,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WalkSection {
    build_file_names: Vec<String>,
    directive_prefix: String,
    strict: bool,
    ignore_file: String,
    #[serde(default)]
    read_build_files_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct PrefetchSection {
    enabled: bool,
    workers: usize,
}

#[derive(Debug, Deserialize)]
struct SettingsFile {
    walk: WalkSection,
    prefetch: PrefetchSection,
}

/// Process-wide walk settings.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Settings {
    /// Absolute path of the repository root
    pub repo_root: PathBuf,

    /// Directory build files are read from instead of the source tree.
    /// Mirrors the source tree layout.
    pub read_build_files_dir: Option<PathBuf>,

    /// Build file names, in preference order
    pub build_file_names: Vec<String>,

    /// Prefix of directive comments, e.g. `gazelle` for `# gazelle:exclude x`
    pub directive_prefix: String,

    /// Stop walking at the first error
    pub strict: bool,

    /// Warm the directory cache in parallel before walking
    pub prefetch: bool,

    /// Prefetch worker threads
    pub prefetch_workers: usize,

    /// Ignore file name, relative to the repository root
    pub ignore_file: String,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

impl Settings {
    /// Settings made of built-in defaults only.
    pub fn for_repo(repo_root: impl Into<PathBuf>) -> Self {
        let defaults = BuiltinDefaults::default();
        Self {
            repo_root: repo_root.into(),
            read_build_files_dir: None,
            build_file_names: defaults.build_file_names,
            directive_prefix: defaults.directive_prefix,
            strict: defaults.strict,
            prefetch: defaults.prefetch,
            prefetch_workers: defaults.prefetch_workers,
            ignore_file: defaults.ignore_file,
            sources: vec![ConfigSource {
                origin: ConfigOrigin::Builtin,
                path: None,
                digest: None,
            }],
        }
    }

    /// Build settings from layers.
    ///
    /// `config_path` defaults to `<repo_root>/.buildwalk.toml`; a missing
    /// default file is skipped, but an explicitly named file must exist.
    pub fn load(
        repo_root: &Path,
        config_path: Option<&Path>,
        cli_overrides: Option<Table>,
    ) -> Result<Self, ConfigError> {
        let mut layers = Vec::new();
        let mut sources = Vec::new();

        // Layer 1: Built-in defaults
        layers.push(BuiltinDefaults::default().to_table());
        sources.push(ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        });

        // Layer 2: Repo config
        let repo_config = match config_path {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default_path = repo_root.join(REPO_CONFIG_FILE);
                default_path.exists().then_some(default_path)
            }
        };
        if let Some(path) = repo_config {
            let (table, digest) = load_toml_file(&path)?;
            layers.push(table);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Repo,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        // Layer 3: CLI overrides
        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let merged = merge_layers(layers);
        let file: SettingsFile = toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError(e.to_string()))?;

        let read_build_files_dir = file.walk.read_build_files_dir.map(|dir| {
            if dir.is_absolute() {
                dir
            } else {
                repo_root.join(dir)
            }
        });

        let settings = Self {
            repo_root: repo_root.to_path_buf(),
            read_build_files_dir,
            build_file_names: file.walk.build_file_names,
            directive_prefix: file.walk.directive_prefix,
            strict: file.walk.strict,
            prefetch: file.prefetch.enabled,
            prefetch_workers: file.prefetch.workers,
            ignore_file: file.walk.ignore_file,
            sources,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check setting values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build_file_names.iter().all(|n| n.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "build_file_names must name at least one file".to_string(),
            ));
        }
        if self.build_file_names.iter().any(|n| n.contains('/')) {
            return Err(ConfigError::ValidationError(
                "build_file_names must be plain file names".to_string(),
            ));
        }
        if self.directive_prefix.is_empty() {
            return Err(ConfigError::ValidationError(
                "directive_prefix must not be empty".to_string(),
            ));
        }
        if self.prefetch_workers == 0 || self.prefetch_workers > 256 {
            return Err(ConfigError::ValidationError(
                "prefetch.workers must be in (0, 256]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load and parse a TOML file, returning the table and digest
fn load_toml_file(path: &Path) -> Result<(Table, String), ConfigError> {
    let bytes = fs::read(path)
        .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    let digest = hex::encode(hasher.finalize());

    let contents = String::from_utf8(bytes).map_err(|e| {
        ConfigError::ParseError(format!("{}: invalid UTF-8: {}", path.display(), e))
    })?;
    let table: Table = toml::from_str(&contents).map_err(|e| {
        ConfigError::ParseError(format!("{}: TOML parse error: {}", path.display(), e))
    })?;

    Ok((table, digest))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
