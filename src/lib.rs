//! Buildwalk - repository walking for build file generators
//!
//! This crate walks a source tree the way a BUILD file generator needs it:
//! every directory's configuration is inherited from its parent and
//! adjusted by directives in its build file, directory metadata is loaded
//! once into a concurrent cache, and a caller-supplied callback runs for
//! each directory in post-order.

pub mod config;
pub mod extension;
pub mod ignore;
pub mod relpath;
pub mod walk;

pub use buildwalk_buildfile::{BuildFile, Directive, ParseError, Rule};
pub use config::{Config, ConfigError, Settings};
pub use extension::Configurer;
pub use ignore::IgnoreList;
pub use walk::{
    current_dir_info, get_dir_info, walk, CallbackError, DirInfo, LoadError, Mode, WalkArgs,
    WalkConfig, WalkContext, WalkError, WalkResponse,
};
