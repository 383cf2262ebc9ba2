//! Buildwalk CLI
//!
//! Entry point for the `buildwalk` command-line tool.

use buildwalk::config::{Config, Settings};
use buildwalk::{walk, Mode, WalkContext, WalkResponse};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use toml::{Table, Value};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "buildwalk")]
#[command(about = "Walk a repository with inherited build file configuration", version)]
struct Cli {
    /// Repository root (default: current directory)
    #[arg(long, global = true)]
    repo_root: Option<PathBuf>,

    /// Path to config file (default: <repo-root>/.buildwalk.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Log every directory load and visit
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the repository and print one line per visited directory
    Walk {
        /// Directories to update (default: the whole repository)
        dirs: Vec<PathBuf>,

        /// Which directories to visit and update
        #[arg(long, default_value = "visit-all-update-subdirs")]
        mode: Mode,

        /// Stop at the first error and reject unknown directives
        #[arg(long)]
        strict: bool,

        /// Do not warm the directory cache in parallel first
        #[arg(long)]
        no_prefetch: bool,

        /// Output JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Show what the walker knows about one directory
    Info {
        /// Directory relative to the repository root
        rel: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let repo_root = match cli.repo_root {
        Some(root) => root,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!("Error reading current directory: {}", e);
                process::exit(1);
            }
        },
    };

    match cli.command {
        Commands::Walk {
            dirs,
            mode,
            strict,
            no_prefetch,
            json,
        } => {
            let overrides = cli_overrides(strict, no_prefetch);
            let settings = load_settings(&repo_root, cli.config.as_deref(), overrides);
            run_walk(settings, &dirs, mode, json);
        }
        Commands::Info { rel, json } => {
            let settings = load_settings(&repo_root, cli.config.as_deref(), None);
            run_info(settings, &rel, json);
        }
    }
}

fn setup_logging(verbose: bool) {
    let default = if verbose {
        "buildwalk=debug,warn"
    } else {
        "buildwalk=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cli_overrides(strict: bool, no_prefetch: bool) -> Option<Table> {
    let mut overrides = Table::new();
    if strict {
        let mut walk = Table::new();
        walk.insert("strict".to_string(), Value::Boolean(true));
        overrides.insert("walk".to_string(), Value::Table(walk));
    }
    if no_prefetch {
        let mut prefetch = Table::new();
        prefetch.insert("enabled".to_string(), Value::Boolean(false));
        overrides.insert("prefetch".to_string(), Value::Table(prefetch));
    }
    (!overrides.is_empty()).then_some(overrides)
}

fn load_settings(repo_root: &Path, config: Option<&Path>, overrides: Option<Table>) -> Settings {
    match Settings::load(repo_root, config, overrides) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    }
}

fn run_walk(settings: Settings, dirs: &[PathBuf], mode: Mode, json: bool) {
    let config = Config::new(settings);
    let mut visited = 0usize;

    let result = walk(&config, &[], dirs, mode, |args| {
        visited += 1;
        if json {
            let line = serde_json::json!({
                "rel": args.rel,
                "update": args.update,
                "build_file": args.build_file.map(|f| f.path.display().to_string()),
                "subdirs": args.subdirs,
                "regular_files": args.regular_files,
                "gen_files": args.gen_files,
            });
            println!("{}", line);
        } else {
            let rel = if args.rel.is_empty() { "." } else { args.rel };
            println!(
                "{}\tupdate={}\tsubdirs={}\tfiles={}\tgen={}",
                rel,
                args.update,
                args.subdirs.len(),
                args.regular_files.len(),
                args.gen_files.len()
            );
        }
        Ok(WalkResponse::default())
    });

    if let Err(e) = result {
        eprintln!("Walk finished with errors after {} directories:", visited);
        for err in e.errors() {
            eprintln!("  {}", err);
        }
        process::exit(1);
    }
}

fn run_info(settings: Settings, rel: &str, json: bool) {
    let ctx = match WalkContext::new(&settings) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };

    let info = match ctx.dir_info(rel) {
        Ok(info) => info,
        Err(e) => {
            eprintln!("Error loading {:?}: {}", rel, e);
            process::exit(1);
        }
    };

    let excludes: Vec<&str> = info.config.excludes.iter().map(|p| p.as_str()).collect();
    let follow: Vec<&str> = info.config.follow.iter().map(|p| p.as_str()).collect();

    if json {
        let output = serde_json::json!({
            "rel": rel,
            "build_file": info.build_file.as_ref().map(|f| f.path.display().to_string()),
            "subdirs": info.subdirs,
            "regular_files": info.regular_files,
            "gen_files": info.gen_files,
            "config": {
                "excludes": excludes,
                "follow": follow,
                "ignore": info.config.ignore,
                "build_file_names": info.config.build_file_names.as_slice(),
                "generation_mode": info.config.generation_mode.to_string(),
            },
        });
        match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    println!("Directory: {}", if rel.is_empty() { "." } else { rel });
    match &info.build_file {
        Some(file) => {
            println!("  Build file: {}", file.path.display());
            println!("  Rules: {}", file.rules.len());
            println!("  Directives: {}", file.directives.len());
        }
        None => println!("  Build file: (none)"),
    }
    println!("  Subdirs: {}", info.subdirs.join(", "));
    println!("  Files: {}", info.regular_files.join(", "));
    if !info.gen_files.is_empty() {
        println!("  Generated: {}", info.gen_files.join(", "));
    }
    if !excludes.is_empty() {
        println!("  Excludes: {}", excludes.join(", "));
    }
    if !follow.is_empty() {
        println!("  Follow: {}", follow.join(", "));
    }
    println!("  Ignore: {}", info.config.ignore);
    println!("  Generation mode: {}", info.config.generation_mode);
}
