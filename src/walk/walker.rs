//! Ordered traversal: configures directories top-down and invokes the
//! callback bottom-up.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use buildwalk_buildfile::BuildFile;
use tracing::{debug, warn};

use super::config::{GenerationMode, WALK_DIRECTIVES};
use super::context::WalkContext;
use super::loader::DirInfo;
use super::{CallbackError, WalkArgs, WalkError, WalkResponse};
use crate::config::Config;
use crate::extension::Configurer;
use crate::relpath;

/// Extension name under which each directory's [`WalkConfig`] is stored in
/// its [`Config`].
///
/// [`WalkConfig`]: super::config::WalkConfig
pub const WALK_CONFIG_EXT: &str = "walk";

/// Which directories are visited and which may be updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Visit the whole repository; update the requested directories and
    /// everything below them.
    #[default]
    VisitAllUpdateSubdirs,
    /// Visit the whole repository; update only the requested directories.
    VisitAllUpdateDirs,
    /// Visit and update only the requested directories.
    UpdateDirs,
    /// Visit and update the requested directories and everything below them.
    UpdateSubdirs,
}

impl Mode {
    fn visits_all(self) -> bool {
        matches!(self, Mode::VisitAllUpdateSubdirs | Mode::VisitAllUpdateDirs)
    }

    fn updates_subdirs(self) -> bool {
        matches!(self, Mode::VisitAllUpdateSubdirs | Mode::UpdateSubdirs)
    }

    /// Directories the prefetcher should warm for this mode, if any.
    pub(crate) fn prefetch_roots(self, rels: &[String]) -> Option<Vec<String>> {
        match self {
            Mode::VisitAllUpdateSubdirs | Mode::VisitAllUpdateDirs => Some(vec![String::new()]),
            Mode::UpdateSubdirs => Some(rels.to_vec()),
            Mode::UpdateDirs => None,
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "visit-all-update-subdirs" => Ok(Mode::VisitAllUpdateSubdirs),
            "visit-all-update-dirs" => Ok(Mode::VisitAllUpdateDirs),
            "update-dirs" => Ok(Mode::UpdateDirs),
            "update-subdirs" => Ok(Mode::UpdateSubdirs),
            other => Err(format!(
                "unknown walk mode {:?}: want one of visit-all-update-subdirs, \
                 visit-all-update-dirs, update-dirs, update-subdirs",
                other
            )),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::VisitAllUpdateSubdirs => "visit-all-update-subdirs",
            Mode::VisitAllUpdateDirs => "visit-all-update-dirs",
            Mode::UpdateDirs => "update-dirs",
            Mode::UpdateSubdirs => "update-subdirs",
        };
        f.write_str(s)
    }
}

/// Decides visiting, calling and updating for each directory.
///
/// Requested directories map to `true`; their proper ancestors map to
/// `false` so the walk can reach them.
#[derive(Debug, Clone)]
pub struct UpdateFilter {
    mode: Mode,
    update_rels: HashMap<String, bool>,
}

impl UpdateFilter {
    pub fn new(mode: Mode, rels: &[String]) -> Self {
        let mut update_rels = HashMap::new();
        for rel in rels {
            update_rels.insert(rel.clone(), true);
        }
        for rel in rels {
            for ancestor in relpath::ancestors(rel) {
                update_rels.entry(ancestor.to_string()).or_insert(false);
            }
        }
        Self { mode, update_rels }
    }

    /// Whether `rel` was requested for update.
    pub fn is_target(&self, rel: &str) -> bool {
        self.update_rels.get(rel).copied().unwrap_or(false)
    }

    /// Whether to descend into `rel`, given whether its parent is updated.
    pub fn should_visit(&self, rel: &str, update_parent: bool) -> bool {
        match self.mode {
            _ if self.mode.visits_all() => true,
            Mode::UpdateSubdirs => update_parent || self.update_rels.contains_key(rel),
            _ => self.update_rels.contains_key(rel),
        }
    }

    /// Whether the callback runs for a visited `rel`.
    pub fn should_call(&self, rel: &str, update_parent: bool) -> bool {
        match self.mode {
            _ if self.mode.visits_all() => true,
            Mode::UpdateSubdirs => update_parent || self.is_target(rel),
            _ => self.is_target(rel),
        }
    }

    /// Whether `rel` may be updated, before build file errors and `ignore`
    /// directives are taken into account.
    pub fn should_update(&self, rel: &str, update_parent: bool) -> bool {
        (self.mode.updates_subdirs() && update_parent) || self.is_target(rel)
    }
}

#[derive(Debug)]
struct Visit {
    /// `None` when the directory is excluded.
    config: Option<Config>,
    contained: bool,
    visited: bool,
    called: bool,
}

struct Entered {
    info: Arc<DirInfo>,
    have_error: bool,
    config: Option<Config>,
    contained: bool,
}

pub(crate) struct Walker<'a, F> {
    ctx: &'a WalkContext,
    configurers: &'a [&'a dyn Configurer],
    known_directives: HashSet<String>,
    filter: UpdateFilter,
    strict: bool,
    callback: F,
    visits: HashMap<String, Visit>,
    scheduled: HashSet<String>,
    queue: VecDeque<String>,
    errors: Vec<WalkError>,
}

impl<'a, F> Walker<'a, F>
where
    F: FnMut(&WalkArgs<'_>) -> Result<WalkResponse, CallbackError>,
{
    pub(crate) fn new(
        ctx: &'a WalkContext,
        configurers: &'a [&'a dyn Configurer],
        filter: UpdateFilter,
        strict: bool,
        callback: F,
    ) -> Self {
        let mut known_directives: HashSet<String> =
            WALK_DIRECTIVES.iter().map(|d| d.to_string()).collect();
        for c in configurers {
            known_directives.extend(c.known_directives().iter().map(|d| d.to_string()));
        }
        Self {
            ctx,
            configurers,
            known_directives,
            filter,
            strict,
            callback,
            visits: HashMap::new(),
            scheduled: HashSet::new(),
            queue: VecDeque::new(),
            errors: Vec::new(),
        }
    }

    /// Walk from the repository root, then drain out-of-band requests.
    ///
    /// Returns the errors collected along the way. An `Err` means the walk
    /// was aborted by a fatal error.
    pub(crate) fn run(mut self, root: &Config) -> Result<Vec<WalkError>, WalkError> {
        self.visit(root, "", false)?;
        if self.stopped() {
            debug!(errors = self.errors.len(), "strict mode: primary pass stopped early");
        }

        while let Some(rel) = self.queue.pop_front() {
            if self.was_called(&rel) {
                continue;
            }
            let dir = relpath::to_abs(self.ctx.repo_root(), &rel);
            if !dir.is_dir() {
                debug!(rel = %rel, "skipping requested directory that does not exist");
                continue;
            }
            let parent = match self.configure_ancestors(root, &rel)? {
                Some(parent) => parent,
                None => {
                    debug!(rel = %rel, "skipping requested directory under an excluded directory");
                    continue;
                }
            };
            self.visit_requested(&parent, &rel)?;
        }

        Ok(self.errors)
    }

    fn stopped(&self) -> bool {
        self.strict && !self.errors.is_empty()
    }

    fn visit(&mut self, parent: &Config, rel: &str, update_parent: bool) -> Result<(), WalkError> {
        if self.stopped() {
            return Ok(());
        }
        debug!(rel, "visiting");

        let entered = self.enter(parent, rel)?;
        let config = match entered.config {
            Some(config) => config,
            None => {
                self.mark_visited(rel);
                return Ok(());
            }
        };
        let info = entered.info;

        let update = self.filter.should_update(rel, update_parent);
        let aggregates = info.config.generation_mode == GenerationMode::UpdateOnly;
        for sub in &info.subdirs {
            if self.stopped() {
                break;
            }
            let child = relpath::join(rel, sub);
            if self.filter.should_visit(&child, update)
                || (aggregates && self.would_be_contained(&child))
            {
                self.visit(&config, &child, update)?;
            }
        }

        // In strict mode a directory already entered still gets its
        // callback after an error; only new directories are skipped.
        self.mark_visited(rel);
        if entered.contained || !self.filter.should_call(rel, update_parent) {
            return Ok(());
        }

        let update = update && !entered.have_error && !info.config.ignore;
        self.call(rel, &config, &info, update);
        Ok(())
    }

    /// Visit an out-of-band request without descending into it, apart
    /// from the contained subdirectories it aggregates.
    fn visit_requested(&mut self, parent: &Config, rel: &str) -> Result<(), WalkError> {
        debug!(rel, "visiting requested directory");
        let entered = self.enter(parent, rel)?;
        self.mark_visited(rel);
        let config = match entered.config {
            Some(config) if !entered.contained => config,
            _ => return Ok(()),
        };
        let info = entered.info;
        if info.config.generation_mode == GenerationMode::UpdateOnly {
            self.enter_contained(&config, rel, &info)?;
        }
        let update = self.filter.is_target(rel) && !entered.have_error && !info.config.ignore;
        self.call(rel, &config, &info, update);
        Ok(())
    }

    /// Load `rel` and configure it the first time it is seen.
    fn enter(&mut self, parent: &Config, rel: &str) -> Result<Entered, WalkError> {
        let loaded = self.ctx.load(rel);
        let have_error = loaded.error.is_some();
        let info = loaded.info;

        if let Some(v) = self.visits.get(rel) {
            return Ok(Entered {
                info,
                have_error,
                config: v.config.clone(),
                contained: v.contained,
            });
        }

        if let Some(e) = loaded.error {
            self.errors.push(WalkError::Load(e));
        }

        let (config, contained) = if info.config.is_excluded(rel) {
            (None, false)
        } else if is_contained(rel, &info, have_error) {
            (Some(parent.clone()), true)
        } else {
            (Some(self.configure(parent, rel, &info)?), false)
        };

        self.visits.insert(
            rel.to_string(),
            Visit {
                config: config.clone(),
                contained,
                visited: false,
                called: false,
            },
        );
        Ok(Entered {
            info,
            have_error,
            config,
            contained,
        })
    }

    fn configure(&self, parent: &Config, rel: &str, info: &DirInfo) -> Result<Config, WalkError> {
        let file = info.build_file.as_ref();
        if let Some(file) = file {
            self.check_directives(file)?;
        }
        let mut config = parent.clone();
        config.set_ext(WALK_CONFIG_EXT, (*info.config).clone());
        for c in self.configurers {
            c.configure(&mut config, rel, file);
        }
        Ok(config)
    }

    fn check_directives(&self, file: &BuildFile) -> Result<(), WalkError> {
        for d in &file.directives {
            if self.known_directives.contains(&d.key) {
                continue;
            }
            warn!(
                "{}:{}: unknown directive: {}:{}",
                file.path.display(),
                d.line,
                file.directive_prefix,
                d.key
            );
            if self.strict {
                return Err(WalkError::UnknownDirective {
                    path: file.path.clone(),
                    key: d.key.clone(),
                });
            }
        }
        Ok(())
    }

    /// Configure every proper ancestor of `rel` not configured yet.
    ///
    /// Returns the parent's config, or `None` if an ancestor is excluded.
    fn configure_ancestors(&mut self, root: &Config, rel: &str) -> Result<Option<Config>, WalkError> {
        let mut config = root.clone();
        for ancestor in relpath::ancestors(rel) {
            match self.enter(&config, ancestor)?.config {
                Some(c) => config = c,
                None => return Ok(None),
            }
        }
        Ok(Some(config))
    }

    /// Enter and mark every contained descendant of `rel`.
    fn enter_contained(&mut self, config: &Config, rel: &str, info: &DirInfo) -> Result<(), WalkError> {
        for sub in &info.subdirs {
            let child = relpath::join(rel, sub);
            if !self.would_be_contained(&child) {
                continue;
            }
            let entered = self.enter(config, &child)?;
            self.mark_visited(&child);
            if let (Some(child_config), true) = (entered.config, entered.contained) {
                self.enter_contained(&child_config, &child, &entered.info)?;
            }
        }
        Ok(())
    }

    fn would_be_contained(&self, rel: &str) -> bool {
        let loaded = self.ctx.load(rel);
        is_contained(rel, &loaded.info, loaded.error.is_some())
    }

    fn mark_visited(&mut self, rel: &str) {
        if let Some(v) = self.visits.get_mut(rel) {
            v.visited = true;
        }
    }

    fn was_called(&self, rel: &str) -> bool {
        self.visits.get(rel).map_or(false, |v| v.called)
    }

    fn call(&mut self, rel: &str, config: &Config, info: &DirInfo, update: bool) {
        if let Some(v) = self.visits.get_mut(rel) {
            v.called = true;
        }
        let mut regular_files = info.regular_files.clone();
        let mut subdirs = info.subdirs.clone();
        self.collect_contained(rel, "", info, &mut regular_files, &mut subdirs);

        let dir = relpath::to_abs(self.ctx.repo_root(), rel);
        let args = WalkArgs {
            dir: &dir,
            rel,
            config,
            update,
            build_file: info.build_file.as_ref(),
            subdirs: &subdirs,
            regular_files: &regular_files,
            gen_files: &info.gen_files,
            context: self.ctx,
        };
        match (self.callback)(&args) {
            Ok(response) => self.schedule(response.rels_to_visit),
            Err(source) => self.errors.push(WalkError::Callback {
                rel: rel.to_string(),
                source,
            }),
        }
    }

    /// Append files and subdirectories of contained descendants of `rel`,
    /// depth-first pre-order, prefixed relative to the aggregating directory.
    fn collect_contained(
        &self,
        rel: &str,
        prefix: &str,
        info: &DirInfo,
        regular_files: &mut Vec<String>,
        subdirs: &mut Vec<String>,
    ) {
        for sub in &info.subdirs {
            let child = relpath::join(rel, sub);
            let contained = self
                .visits
                .get(&child)
                .map_or(false, |v| v.contained && v.visited);
            if !contained {
                continue;
            }
            let child_prefix = relpath::join(prefix, sub);
            let child_info = self.ctx.load(&child).info;
            regular_files.extend(
                child_info
                    .regular_files
                    .iter()
                    .map(|f| relpath::join(&child_prefix, f)),
            );
            subdirs.extend(child_info.subdirs.iter().map(|d| relpath::join(&child_prefix, d)));
            self.collect_contained(&child, &child_prefix, &child_info, regular_files, subdirs);
        }
    }

    fn schedule(&mut self, rels: Vec<String>) {
        for rel in rels {
            let rel = relpath::clean(&rel);
            if self.was_called(&rel) {
                continue;
            }
            if self.scheduled.insert(rel.clone()) {
                self.queue.push_back(rel);
            }
        }
    }
}

/// A directory without its own build file in `update_only` mode belongs to
/// the nearest ancestor that has one.
fn is_contained(rel: &str, info: &DirInfo, have_error: bool) -> bool {
    !rel.is_empty()
        && info.build_file.is_none()
        && !have_error
        && info.config.generation_mode == GenerationMode::UpdateOnly
}
