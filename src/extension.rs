//! Configuration extensions
//!
//! A [`Configurer`] reads its own directives from each directory's build
//! file and records per-directory settings in the directory's [`Config`].
//! The walker calls every registered configurer once per configured
//! directory, in registration order, after the directory's walk settings
//! (excludes, follow patterns, ignore) have been computed.

use buildwalk_buildfile::BuildFile;

use crate::config::Config;

pub trait Configurer: Send + Sync {
    /// Short name, used in log messages.
    fn name(&self) -> &str;

    /// Directive keys this configurer handles, without the prefix.
    fn known_directives(&self) -> &[&str];

    /// Update `config` for the directory at `rel`.
    ///
    /// `config` starts as a clone of the parent directory's configuration.
    /// `file` is `None` when the directory has no build file or its build
    /// file could not be parsed.
    fn configure(&self, config: &mut Config, rel: &str, file: Option<&BuildFile>);
}
