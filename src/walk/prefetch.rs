//! Parallel cache warm-up ahead of the ordered walk.
//!
//! Loads every directory under the given roots on a fixed-size thread pool
//! so the walker mostly finds its directories already cached. Skipping the
//! prefetch never changes walk results.

use rayon::Scope;
use tracing::{debug, warn};

use super::context::WalkContext;
use crate::relpath;

/// Load `rels`, their ancestors and all of their descendants into the cache
/// of `ctx`, using at most `workers` threads.
pub fn prefetch(ctx: &WalkContext, rels: &[String], workers: usize) {
    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("buildwalk-prefetch-{}", i))
        .build()
    {
        Ok(pool) => pool,
        Err(e) => {
            warn!("skipping prefetch: cannot start worker pool: {}", e);
            return;
        }
    };

    // Ancestors first, in order: a directory's config comes from its parent.
    for rel in rels {
        for ancestor in relpath::ancestors(rel) {
            ctx.load(ancestor);
        }
    }

    pool.scope(|s| {
        for rel in rels {
            let rel = rel.clone();
            s.spawn(move |s| prefetch_dir(ctx, s, rel));
        }
    });
    debug!(dirs = ctx.cached_dirs(), "prefetch finished");
}

fn prefetch_dir<'scope>(ctx: &'scope WalkContext, scope: &Scope<'scope>, rel: String) {
    let info = ctx.load(&rel).info;
    for sub in &info.subdirs {
        let child = relpath::join(&rel, sub);
        if info.config.is_excluded(&child) {
            continue;
        }
        scope.spawn(move |s| prefetch_dir(ctx, s, child));
    }
}
