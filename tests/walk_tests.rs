//! Walk integration tests
//!
//! Each test builds a small repository in a temp directory and records the
//! callback invocations of a full walk.

use buildwalk::config::{Config, Settings};
use buildwalk::extension::Configurer;
use buildwalk::{current_dir_info, walk, BuildFile, Mode, WalkContext, WalkError, WalkResponse};
use parking_lot::Mutex;
use std::fs;
use std::panic;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

/// Only one walk may be active per process.
static WALK_LOCK: Mutex<()> = parking_lot::const_mutex(());

#[derive(Debug, Clone, PartialEq)]
struct Call {
    rel: String,
    update: bool,
    files: Vec<String>,
    subdirs: Vec<String>,
    tags: Vec<String>,
}

/// Accumulates `# gazelle:tag x` values down the tree.
struct TagConfigurer;

impl Configurer for TagConfigurer {
    fn name(&self) -> &str {
        "tags"
    }

    fn known_directives(&self) -> &[&str] {
        &["tag"]
    }

    fn configure(&self, config: &mut Config, _rel: &str, file: Option<&BuildFile>) {
        let mut tags: Vec<String> = config.ext_or_default("tags");
        if let Some(file) = file {
            tags.extend(file.directive_values("tag").map(str::to_string));
        }
        config.set_ext("tags", tags);
    }
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn mkdirs(root: &Path, dirs: &[&str]) {
    for d in dirs {
        fs::create_dir_all(root.join(d)).unwrap();
    }
}

fn dirs(root: &Path, rels: &[&str]) -> Vec<PathBuf> {
    rels.iter().map(|r| root.join(r)).collect()
}

/// Walk and record every call. `respond` supplies each call's out-of-band
/// requests.
fn run_with<R>(
    settings: Settings,
    rels: &[&str],
    mode: Mode,
    mut respond: R,
) -> (Vec<Call>, Result<(), WalkError>)
where
    R: FnMut(&str) -> Vec<String>,
{
    let _lock = WALK_LOCK.lock();
    let root = settings.repo_root.clone();
    let config = Config::new(settings);
    let tags = TagConfigurer;
    let configurers: [&dyn Configurer; 1] = [&tags];
    let mut calls = Vec::new();

    let result = walk(&config, &configurers, &dirs(&root, rels), mode, |args| {
        calls.push(Call {
            rel: args.rel.to_string(),
            update: args.update,
            files: args.regular_files.to_vec(),
            subdirs: args.subdirs.to_vec(),
            tags: args.config.ext_or_default("tags"),
        });
        Ok(WalkResponse {
            rels_to_visit: respond(args.rel),
        })
    });
    (calls, result)
}

fn run(settings: Settings, rels: &[&str], mode: Mode) -> (Vec<Call>, Result<(), WalkError>) {
    run_with(settings, rels, mode, |_| Vec::new())
}

fn order(calls: &[Call]) -> Vec<(&str, bool)> {
    calls.iter().map(|c| (c.rel.as_str(), c.update)).collect()
}

// =============================================================================
// Ordering and update flags
// =============================================================================

#[test]
fn test_update_flags_for_errors_and_ignore() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    mkdirs(root, &["update/sub/sub"]);
    write(root, "update/ignore/BUILD", "# gazelle:ignore\n");
    mkdirs(root, &["update/ignore/sub"]);
    write(root, "update/error/BUILD", "(\n");
    mkdirs(root, &["update/error/sub"]);

    let (calls, result) = run(Settings::for_repo(root), &["update"], Mode::VisitAllUpdateSubdirs);

    assert_eq!(
        order(&calls),
        vec![
            ("update/error/sub", true),
            ("update/error", false),
            ("update/ignore/sub", true),
            ("update/ignore", false),
            ("update/sub/sub", true),
            ("update/sub", true),
            ("update", true),
            ("", false),
        ]
    );
    let err = result.unwrap_err();
    assert_eq!(err.errors().len(), 1);
    assert!(matches!(err.errors()[0], WalkError::Load(_)));
}

#[test]
fn test_post_order_from_root() {
    let dir = TempDir::new().unwrap();
    mkdirs(dir.path(), &["a/b"]);

    let (calls, result) = run(Settings::for_repo(dir.path()), &[], Mode::VisitAllUpdateSubdirs);
    result.unwrap();
    assert_eq!(order(&calls), vec![("a/b", true), ("a", true), ("", true)]);
}

#[test]
fn test_visit_all_update_dirs() {
    let dir = TempDir::new().unwrap();
    mkdirs(dir.path(), &["a/b", "c"]);

    let (calls, result) = run(Settings::for_repo(dir.path()), &["a"], Mode::VisitAllUpdateDirs);
    result.unwrap();
    assert_eq!(
        order(&calls),
        vec![("a/b", false), ("a", true), ("c", false), ("", false)]
    );
}

#[test]
fn test_prefetch_does_not_change_results() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    mkdirs(root, &["a/b/c", "a/d", "e/f/g", "vendor/x"]);
    write(root, "BUILD", "# gazelle:exclude vendor\n");
    write(root, "a/BUILD", "# gazelle:tag a\n");
    write(root, "a/b/f.go", "");
    write(root, "e/f/BUILD", "# gazelle:generation_mode update_only\n");
    write(root, "e/f/g/h.go", "");

    let mut with = Settings::for_repo(root);
    with.prefetch = true;
    with.prefetch_workers = 4;
    let mut without = Settings::for_repo(root);
    without.prefetch = false;

    let (a, ra) = run(with, &[], Mode::VisitAllUpdateSubdirs);
    let (b, rb) = run(without, &[], Mode::VisitAllUpdateSubdirs);
    ra.unwrap();
    rb.unwrap();
    assert_eq!(a, b);
    assert!(!a.iter().any(|c| c.rel.starts_with("vendor")));
}

// =============================================================================
// Configuration inheritance
// =============================================================================

#[test]
fn test_child_config_is_parent_plus_own_directives() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "BUILD", "# gazelle:tag root\n");
    write(root, "a/BUILD", "# gazelle:tag a\n");
    write(root, "a/b/BUILD", "# gazelle:tag b\n");
    write(root, "a/c/BUILD", "# gazelle:tag c\n");
    mkdirs(root, &["d"]);

    let (calls, result) = run(Settings::for_repo(root), &[], Mode::VisitAllUpdateSubdirs);
    result.unwrap();

    let tags = |rel: &str| -> Vec<String> {
        calls.iter().find(|c| c.rel == rel).unwrap().tags.clone()
    };
    assert_eq!(tags(""), vec!["root"]);
    assert_eq!(tags("a"), vec!["root", "a"]);
    assert_eq!(tags("a/b"), vec!["root", "a", "b"]);
    assert_eq!(tags("a/c"), vec!["root", "a", "c"]);
    assert_eq!(tags("d"), vec!["root"]);
}

#[test]
fn test_excluded_dirs_are_not_visited() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    mkdirs(root, &["keep", "gen/x", "third_party/a/testdata", "skipme/inner"]);
    write(root, "BUILD", "# gazelle:exclude gen\n# gazelle:exclude **/testdata\n");
    write(root, "skipme/BUILD", "# gazelle:exclude .\n");
    write(root, "keep/a.pb.go", "");
    write(root, "keep/a.go", "");
    write(root, "keep/BUILD", "# gazelle:exclude *.pb.go\n");

    let (calls, result) = run(Settings::for_repo(root), &[], Mode::VisitAllUpdateSubdirs);
    result.unwrap();

    let rels: Vec<&str> = calls.iter().map(|c| c.rel.as_str()).collect();
    assert_eq!(rels, vec!["keep", "third_party/a", "third_party", ""]);
    let keep = &calls[0];
    assert_eq!(keep.files, vec!["BUILD", "a.go"]);
    assert_eq!(calls[3].subdirs, vec!["keep", "skipme", "third_party"]);
}

#[test]
fn test_ignore_file_excludes_paths() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    mkdirs(root, &["bazel-out/bin", "src", "node_modules"]);
    write(root, ".bazelignore", "# build outputs\nbazel-out\nnode_modules/\n*.tmp\n");

    let (calls, result) = run(Settings::for_repo(root), &[], Mode::VisitAllUpdateSubdirs);
    result.unwrap();
    assert_eq!(order(&calls), vec![("src", true), ("", true)]);
    assert_eq!(calls[1].subdirs, vec!["src"]);
}

#[test]
fn test_repo_config_selects_build_file_names() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, ".buildwalk.toml", "[walk]\nbuild_file_names = [\"BUILD.plz\"]\n");
    write(root, "pkg/BUILD.plz", "# gazelle:tag plz\n");
    write(root, "pkg/BUILD", "# gazelle:tag bazel\n");

    let settings = Settings::load(root, None, None).unwrap();
    let (calls, result) = run(settings, &[], Mode::VisitAllUpdateSubdirs);
    result.unwrap();
    let pkg = calls.iter().find(|c| c.rel == "pkg").unwrap();
    assert_eq!(pkg.tags, vec!["plz"]);
}

#[test]
fn test_build_files_from_alternate_root() {
    let dir = TempDir::new().unwrap();
    let shadow = TempDir::new().unwrap();
    mkdirs(dir.path(), &["pkg"]);
    write(dir.path(), "pkg/BUILD", "# gazelle:tag source\n");
    write(shadow.path(), "pkg/BUILD", "# gazelle:tag shadow\n");

    let mut settings = Settings::for_repo(dir.path());
    settings.read_build_files_dir = Some(shadow.path().to_path_buf());
    let (calls, result) = run(settings, &[], Mode::VisitAllUpdateSubdirs);
    result.unwrap();
    let pkg = calls.iter().find(|c| c.rel == "pkg").unwrap();
    assert_eq!(pkg.tags, vec!["shadow"]);
}

#[cfg(unix)]
#[test]
fn test_followed_symlink_is_walked() {
    use std::os::unix::fs::symlink;

    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "real/x.go", "");
    symlink(root.join("real"), root.join("linked")).unwrap();
    symlink(root.join("real"), root.join("opaque")).unwrap();
    write(root, "BUILD", "# gazelle:follow linked\n");

    let (calls, result) = run(Settings::for_repo(root), &[], Mode::VisitAllUpdateSubdirs);
    result.unwrap();

    let linked = calls.iter().find(|c| c.rel == "linked").unwrap();
    assert_eq!(linked.files, vec!["x.go"]);
    assert!(!calls.iter().any(|c| c.rel == "opaque"));
    let top = calls.last().unwrap();
    assert_eq!(top.subdirs, vec!["linked", "real"]);
    assert_eq!(top.files, vec!["BUILD", "opaque"]);
}

// =============================================================================
// update_only aggregation
// =============================================================================

#[test]
fn test_contained_dirs_merge_into_nearest_build_file() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "BUILD", "# gazelle:generation_mode update_only\n");
    write(root, "lib/BUILD", "");
    write(root, "lib/lib.go", "");
    write(root, "lib/internal/a.go", "");
    write(root, "lib/internal/deep/b.go", "");
    write(root, "lib/internal/deep/deeper/c.go", "");
    write(root, "lib/other/BUILD", "");
    write(root, "lib/other/d.go", "");

    let (calls, result) = run(Settings::for_repo(root), &[], Mode::VisitAllUpdateSubdirs);
    result.unwrap();
    assert_eq!(
        calls.iter().map(|c| c.rel.as_str()).collect::<Vec<_>>(),
        vec!["lib/other", "lib", ""]
    );

    let lib = &calls[1];
    assert_eq!(
        lib.files,
        vec![
            "BUILD",
            "lib.go",
            "internal/a.go",
            "internal/deep/b.go",
            "internal/deep/deeper/c.go",
        ]
    );
    assert_eq!(
        lib.subdirs,
        vec!["internal", "other", "internal/deep", "internal/deep/deeper"]
    );
    assert_eq!(calls[0].files, vec!["BUILD", "d.go"]);
}

#[test]
fn test_contained_dirs_aggregate_in_update_dirs_mode() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "BUILD", "# gazelle:generation_mode update_only\n");
    write(root, "lib/BUILD", "");
    write(root, "lib/sub/a.go", "");

    let (calls, result) = run(Settings::for_repo(root), &["lib"], Mode::UpdateDirs);
    result.unwrap();
    assert_eq!(order(&calls), vec![("lib", true)]);
    assert_eq!(calls[0].files, vec!["BUILD", "sub/a.go"]);
}

// =============================================================================
// Out-of-band visits
// =============================================================================

#[test]
fn test_out_of_band_requests_are_deduplicated() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    mkdirs(root, &["a", "b", "dep/inner"]);

    let (calls, result) = run_with(Settings::for_repo(root), &["a", "b"], Mode::UpdateDirs, |rel| {
        match rel {
            "a" | "b" => vec!["dep".to_string(), "./dep/".to_string(), "missing".to_string()],
            _ => Vec::new(),
        }
    });
    result.unwrap();
    assert_eq!(order(&calls), vec![("a", true), ("b", true), ("dep", false)]);
}

#[test]
fn test_out_of_band_request_for_scheduled_target_keeps_update() {
    let dir = TempDir::new().unwrap();
    mkdirs(dir.path(), &["a", "b"]);

    let (calls, result) = run_with(Settings::for_repo(dir.path()), &["a", "b"], Mode::UpdateDirs, |rel| {
        if rel == "a" {
            vec!["b".to_string()]
        } else {
            Vec::new()
        }
    });
    result.unwrap();
    assert_eq!(order(&calls), vec![("a", true), ("b", true)]);
}

#[test]
fn test_out_of_band_configures_ancestors() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    mkdirs(root, &["a"]);
    write(root, "x/BUILD", "# gazelle:tag x\n");
    write(root, "x/y/BUILD", "# gazelle:tag y\n");
    write(root, "skip/BUILD", "# gazelle:exclude .\n");
    mkdirs(root, &["skip/z"]);

    let (calls, result) = run_with(Settings::for_repo(root), &["a"], Mode::UpdateDirs, |rel| {
        if rel == "a" {
            vec!["x/y".to_string(), "skip/z".to_string()]
        } else {
            Vec::new()
        }
    });
    result.unwrap();
    assert_eq!(order(&calls), vec![("a", true), ("x/y", false)]);
    assert_eq!(calls[1].tags, vec!["x", "y"]);
}

#[test]
fn test_out_of_band_runs_after_strict_stop() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    mkdirs(root, &["a", "dep"]);
    write(root, "b/BUILD", "[\n");

    let mut settings = Settings::for_repo(root);
    settings.strict = true;
    let (calls, result) = run_with(settings, &["a", "b"], Mode::UpdateDirs, |rel| {
        if rel == "a" {
            vec!["dep".to_string()]
        } else {
            Vec::new()
        }
    });
    assert!(result.is_err());
    assert_eq!(order(&calls), vec![("a", true), ("b", false), ("dep", false)]);
}

#[test]
fn test_out_of_band_request_for_ancestor_without_callback() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "lib/BUILD", "");
    mkdirs(root, &["lib/app"]);

    let (calls, result) = run_with(Settings::for_repo(root), &["lib/app"], Mode::UpdateDirs, |rel| {
        if rel == "lib/app" {
            vec!["lib".to_string(), "lib/app".to_string()]
        } else {
            Vec::new()
        }
    });
    result.unwrap();
    assert_eq!(order(&calls), vec![("lib/app", true), ("lib", false)]);
}

#[test]
fn test_out_of_band_visit_aggregates_contained_dirs() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "BUILD", "# gazelle:generation_mode update_only\n");
    write(root, "a/BUILD", "");
    write(root, "lib/BUILD", "");
    write(root, "lib/internal/x.go", "");
    write(root, "lib/internal/deep/y.go", "");

    let (calls, result) = run_with(Settings::for_repo(root), &["a"], Mode::UpdateDirs, |rel| {
        if rel == "a" {
            vec!["lib".to_string()]
        } else {
            Vec::new()
        }
    });
    result.unwrap();
    assert_eq!(order(&calls), vec![("a", true), ("lib", false)]);
    assert_eq!(calls[1].files, vec!["BUILD", "internal/x.go", "internal/deep/y.go"]);
    assert_eq!(calls[1].subdirs, vec!["internal", "internal/deep"]);

    let (primary, result) = run(Settings::for_repo(root), &["lib"], Mode::UpdateDirs);
    result.unwrap();
    assert_eq!(primary[0].files, calls[1].files);
    assert_eq!(primary[0].subdirs, calls[1].subdirs);
}

// =============================================================================
// Errors and strict mode
// =============================================================================

#[test]
fn test_non_strict_continues_past_broken_build_file() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "bad/BUILD", "go_library(name = \"x\"\n");
    write(root, "good/a.go", "");

    let (calls, result) = run(Settings::for_repo(root), &[], Mode::VisitAllUpdateSubdirs);
    assert!(result.is_err());
    assert_eq!(order(&calls), vec![("bad", false), ("good", true), ("", true)]);
}

#[test]
fn test_strict_stops_after_first_error() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "bad/BUILD", "go_library(name = \"x\"\n");
    write(root, "good/a.go", "");

    let mut settings = Settings::for_repo(root);
    settings.strict = true;
    let (calls, result) = run(settings, &[], Mode::VisitAllUpdateSubdirs);
    let err = result.unwrap_err();
    assert_eq!(err.errors().len(), 1);
    // Directories already entered finish; "good" is never started.
    assert_eq!(order(&calls), vec![("bad", false), ("", true)]);
}

#[test]
fn test_deeply_nested_build_file_is_a_load_error() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let depth = 20_000;
    write(
        root,
        "deep/BUILD",
        &format!("x = {}{}\n", "[".repeat(depth), "]".repeat(depth)),
    );
    write(root, "good/a.go", "");

    let (calls, result) = run(Settings::for_repo(root), &[], Mode::VisitAllUpdateSubdirs);
    assert_eq!(order(&calls), vec![("deep", false), ("good", true), ("", true)]);
    let err = result.unwrap_err();
    assert_eq!(err.errors().len(), 1);
    assert!(err.to_string().contains("nested more than"));
}

#[test]
fn test_unknown_directive() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "pkg/BUILD", "# gazelle:frobnicate yes\n# gazelle:tag ok\n");

    let (calls, result) = run(Settings::for_repo(dir.path()), &[], Mode::VisitAllUpdateSubdirs);
    result.unwrap();
    assert_eq!(calls.len(), 2);

    let mut settings = Settings::for_repo(dir.path());
    settings.strict = true;
    let (calls, result) = run(settings, &[], Mode::VisitAllUpdateSubdirs);
    match result {
        Err(WalkError::UnknownDirective { key, .. }) => assert_eq!(key, "frobnicate"),
        other => panic!("expected unknown directive error, got {:?}", other),
    }
    assert!(calls.is_empty());
}

#[test]
fn test_callback_errors_are_collected() {
    let dir = TempDir::new().unwrap();
    mkdirs(dir.path(), &["a", "b"]);

    let _lock = WALK_LOCK.lock();
    let config = Config::new(Settings::for_repo(dir.path()));
    let mut seen = Vec::new();
    let result = walk(&config, &[], &[dir.path()], Mode::VisitAllUpdateSubdirs, |args| {
        seen.push(args.rel.to_string());
        if args.rel == "a" {
            return Err("cannot update a".into());
        }
        Ok(WalkResponse::default())
    });

    assert_eq!(seen, vec!["a", "b", ""]);
    match result {
        Err(WalkError::Callback { rel, source }) => {
            assert_eq!(rel, "a");
            assert_eq!(source.to_string(), "cannot update a");
        }
        other => panic!("expected callback error, got {:?}", other),
    }
}

#[test]
fn test_dir_outside_repo_is_rejected() {
    let dir = TempDir::new().unwrap();
    let other = TempDir::new().unwrap();
    let config = Config::new(Settings::for_repo(dir.path()));
    let result = walk(&config, &[], &[other.path()], Mode::UpdateDirs, |_| {
        Ok(WalkResponse::default())
    });
    assert!(matches!(result, Err(WalkError::OutsideRepo { .. })));
}

// =============================================================================
// Walk context
// =============================================================================

#[test]
fn test_dir_info_during_walk() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "lib/BUILD", "genrule(name = \"g\", outs = [\"out.txt\"])\n");
    mkdirs(root, &["app"]);

    let _lock = WALK_LOCK.lock();
    let config = Config::new(Settings::for_repo(root));
    let mut gen_files = Vec::new();
    let result = walk(&config, &[], &[root.join("app")], Mode::UpdateDirs, |args| {
        let info = current_dir_info("lib")?;
        gen_files = info.gen_files.clone();
        let same = args.context.dir_info("lib")?;
        assert!(Arc::ptr_eq(&info, &same));
        Ok(WalkResponse::default())
    });
    result.unwrap();
    assert_eq!(gen_files, vec!["out.txt"]);
    assert!(matches!(current_dir_info("lib"), Err(WalkError::NoActiveWalk)));
}

#[test]
fn test_nested_walk_panics() {
    let dir = TempDir::new().unwrap();
    let _lock = WALK_LOCK.lock();
    let config = Config::new(Settings::for_repo(dir.path()));
    let roots = [dir.path()];

    let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        let _ = walk(&config, &[], &roots, Mode::UpdateDirs, |_| {
            let _ = walk(&config, &[], &roots, Mode::UpdateDirs, |_| Ok(WalkResponse::default()));
            Ok(WalkResponse::default())
        });
    }));
    assert!(result.is_err());

    // The outer walk's registration was released while unwinding.
    walk(&config, &[], &roots, Mode::UpdateDirs, |_| Ok(WalkResponse::default())).unwrap();
}

#[test]
fn test_concurrent_dir_info_shares_one_load() {
    let dir = TempDir::new().unwrap();
    mkdirs(dir.path(), &["a/b/c"]);
    write(dir.path(), "a/b/c/f.go", "");

    let ctx = WalkContext::new(&Settings::for_repo(dir.path())).unwrap();
    let barrier = Barrier::new(8);
    let infos: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (ctx, barrier) = (&ctx, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    ctx.dir_info("a/b/c").unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for info in &infos {
        assert!(Arc::ptr_eq(info, &infos[0]));
    }
    assert_eq!(infos[0].regular_files, vec!["f.go"]);
    assert_eq!(ctx.cached_dirs(), 4);
}
