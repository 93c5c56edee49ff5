//! File watching and cache invalidation.
//!
//! A recursive watcher over the project root (minus `node_modules`, `.git`,
//! hidden files, and configured exclusions) feeds change events into an
//! async task that refreshes the file cache, evicts rewritten output, runs
//! HMR propagation, and broadcasts the resulting update. Events are
//! processed in arrival order; each gets its own strictly increasing
//! timestamp, so coalescing happens in the propagator's dirty sets rather
//! than here.

use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::context::ServerContext;
use crate::error::Result;
use crate::hmr;
use crate::resolve::clean_url;

/// A change observed on disk.
#[derive(Debug, Clone)]
pub enum FileChange {
    Modified(PathBuf),
    Created(PathBuf),
    Removed(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Modified(p) | FileChange::Created(p) | FileChange::Removed(p) => p,
        }
    }
}

/// Start watching the project root and spawn the invalidation task.
pub fn start(ctx: &Arc<ServerContext>) -> Result<()> {
    let (tx, rx) = mpsc::channel::<FileChange>(256);

    let root = ctx.root.clone();
    let exclude = ctx.config.watch_exclude.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let Ok(event) = res else { return };
        for path in &event.paths {
            if should_ignore(path, &root, &exclude) {
                continue;
            }
            let change = match event.kind {
                EventKind::Create(_) => FileChange::Created(path.clone()),
                EventKind::Modify(_) => FileChange::Modified(path.clone()),
                EventKind::Remove(_) => FileChange::Removed(path.clone()),
                _ => continue,
            };
            // Queue overflow just drops the event; the next change to the
            // same file re-triggers invalidation.
            let _ = tx.blocking_send(change);
        }
    })?;
    watcher.watch(&ctx.root, RecursiveMode::Recursive)?;
    ctx.watch.install(watcher);

    let ctx = ctx.clone();
    tokio::spawn(invalidation_loop(ctx, rx));
    Ok(())
}

async fn invalidation_loop(ctx: Arc<ServerContext>, mut rx: mpsc::Receiver<FileChange>) {
    while let Some(change) = rx.recv().await {
        apply_change(&ctx, change).await;
    }
}

/// Apply one change event: refresh / evict caches, then propagate.
///
/// The watcher task calls this for every filesystem event; plugins that
/// synthesize content can call it directly to invalidate and push updates.
pub async fn apply_change(ctx: &Arc<ServerContext>, change: FileChange) {
    {
        let listeners = ctx.watch_listeners.lock();
        for listener in listeners.iter() {
            listener(&change);
        }
    }

    match change {
        FileChange::Modified(path) | FileChange::Created(path) => {
            handle_update(ctx, &path).await;
        }
        FileChange::Removed(path) => {
            handle_unlink(ctx, &path);
        }
    }
}

async fn handle_update(ctx: &Arc<ServerContext>, path: &Path) {
    if !path.is_file() {
        return;
    }

    // Refresh the reader cache so the next request sees the new bytes.
    if let Err(err) = ctx.read(path).await {
        tracing::debug!("re-read of changed file failed: {err}");
        return;
    }

    let Some(public_path) = ctx.resolver.file_to_request(path) else {
        // Watched file outside the root: cache refreshed, nothing to map
        // into the graph.
        return;
    };

    ctx.rewrite_cache.evict_prefix(&public_path);

    let timestamp = ctx.next_timestamp();
    let clean_id = clean_url(&public_path).to_string();
    let message = {
        let mut graph = ctx.graph.lock();
        hmr::propagate(&mut graph, &clean_id, timestamp)
    };

    match &message {
        hmr::HmrMessage::FullReload { .. } => {
            tracing::info!("{clean_id} changed; no HMR boundary found, full reload");
        }
        hmr::HmrMessage::Update { updates, .. } => {
            tracing::info!("{clean_id} changed; {} HMR update(s)", updates.len());
        }
        hmr::HmrMessage::Connected => {}
    }
    ctx.hmr.send(&message);
}

fn handle_unlink(ctx: &Arc<ServerContext>, path: &Path) {
    ctx.file_cache.evict(path);
    let Some(public_path) = ctx.resolver.file_to_request(path) else {
        return;
    };
    ctx.rewrite_cache.evict_prefix(&public_path);

    // The deleted module stops importing anything, but its importers keep
    // their (dangling) edges: a request for the deleted file should 404
    // with a clear message, not vanish from the graph silently.
    let clean_id = clean_url(&public_path).to_string();
    ctx.graph.lock().clear_importees(&clean_id);
    tracing::info!("{clean_id} deleted");
}

/// Watcher-side filter: only project files are interesting.
fn should_ignore(path: &Path, root: &Path, exclude: &[String]) -> bool {
    let rel = match path.strip_prefix(root) {
        Ok(rel) => rel,
        // Files outside the root are watched individually and on purpose.
        Err(_) => return false,
    };

    for component in rel.components() {
        let Some(name) = component.as_os_str().to_str() else {
            return true;
        };
        if name == "node_modules" || name == ".git" {
            return true;
        }
        if name.starts_with('.') && name != "." && name != ".." {
            return true;
        }
    }

    let rel_str = rel.to_string_lossy();
    for pattern in exclude {
        if let Some(ext) = pattern.strip_prefix('*') {
            if rel_str.ends_with(ext) {
                return true;
            }
        } else if rel_str.starts_with(pattern.as_str())
            || rel_str.contains(&format!("/{pattern}"))
        {
            return true;
        }
    }

    false
}
