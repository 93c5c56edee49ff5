//! Shared server context.
//!
//! Every cache, the import graph, the seen-URLs set, and the HMR client
//! registry live on one [`ServerContext`] instance rather than as process
//! globals, so multiple servers in one process stay isolated. All locks are
//! `parking_lot` and are never held across an await point.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cache::file::{FileCache, FileEntry};
use crate::cache::rewrite::RewriteCache;
use crate::config::ServerConfig;
use crate::error::{ConfigError, Result};
use crate::graph::ImportGraph;
use crate::hmr::ws::HmrBroadcaster;
use crate::resolve::Resolver;

/// Public path of the embedded HMR client runtime.
pub const CLIENT_PUBLIC_PATH: &str = "/@skiff/client";

/// Public path of the generated `import.meta.env` module.
pub const ENV_PUBLIC_PATH: &str = "/@skiff/env";

/// Websocket endpoint for HMR updates.
pub const HMR_PATH: &str = "/__hmr";

/// Callback invoked for every filesystem change event, before the built-in
/// invalidation runs.
pub type WatchListener = Box<dyn Fn(&crate::watch::FileChange) + Send + Sync>;

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("root", &self.root)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// State shared by middlewares, the watcher, and the HMR endpoint.
pub struct ServerContext {
    pub root: PathBuf,
    pub config: ServerConfig,
    pub resolver: Resolver,
    pub graph: Mutex<ImportGraph>,
    pub file_cache: FileCache,
    pub rewrite_cache: RewriteCache,
    /// URLs served at least once by this process. Gates 304 responses.
    pub seen_urls: Mutex<FxHashSet<String>>,
    pub hmr: HmrBroadcaster,
    pub watch: WatchHandle,
    pub(crate) watch_listeners: Mutex<Vec<WatchListener>>,
    last_timestamp: Mutex<u64>,
}

impl ServerContext {
    /// Build the context for one server instance. The project root must
    /// exist; it is canonicalized so path-prefix checks are reliable.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>> {
        let root = config
            .root
            .canonicalize()
            .map_err(|_| ConfigError::RootNotFound(config.root.clone()))?;
        if !root.is_dir() {
            return Err(ConfigError::RootNotFound(root).into());
        }

        let resolver = Resolver::new(root.clone(), config.aliases.clone());
        Ok(Arc::new(Self {
            root,
            config,
            resolver,
            graph: Mutex::new(ImportGraph::new()),
            file_cache: FileCache::new(),
            rewrite_cache: RewriteCache::new(),
            seen_urls: Mutex::new(FxHashSet::default()),
            hmr: HmrBroadcaster::new(),
            watch: WatchHandle::default(),
            watch_listeners: Mutex::new(Vec::new()),
            last_timestamp: Mutex::new(0),
        }))
    }

    /// Read a file through the reader cache.
    ///
    /// Files outside the project root (reachable through aliases) are
    /// registered with the watcher on first read, unless they live under a
    /// `node_modules` directory.
    pub async fn read(&self, path: &Path) -> Result<FileEntry> {
        let entry = self.file_cache.read(path).await?;
        if !path.starts_with(&self.root)
            && !path.components().any(|c| c.as_os_str() == "node_modules")
        {
            self.watch.add_file(path);
        }
        Ok(entry)
    }

    /// Next change-event timestamp: epoch milliseconds, strictly
    /// increasing even when two events land in the same millisecond.
    pub fn next_timestamp(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut last = self.last_timestamp.lock();
        let next = now.max(*last + 1);
        *last = next;
        next
    }
}

/// Handle to the filesystem watcher, for registering files on demand.
#[derive(Default)]
pub struct WatchHandle {
    inner: Mutex<Option<RecommendedWatcher>>,
}

impl WatchHandle {
    pub fn install(&self, watcher: RecommendedWatcher) {
        *self.inner.lock() = Some(watcher);
    }

    /// Watch a single file outside the recursive root watch.
    pub fn add_file(&self, path: &Path) {
        let mut guard = self.inner.lock();
        if let Some(watcher) = guard.as_mut() {
            if let Err(err) = watcher.watch(path, RecursiveMode::NonRecursive) {
                tracing::warn!("failed to watch {}: {err}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_root_is_config_error() {
        let config = ServerConfig::new("/definitely/not/a/dir");
        let err = ServerContext::new(config).unwrap_err();
        assert!(matches!(err, crate::error::ServerError::Config(_)));
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ServerContext::new(ServerConfig::new(dir.path())).unwrap();
        let a = ctx.next_timestamp();
        let b = ctx.next_timestamp();
        let c = ctx.next_timestamp();
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn test_contexts_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.js"), "export {}").unwrap();

        let ctx1 = ServerContext::new(ServerConfig::new(dir.path())).unwrap();
        let ctx2 = ServerContext::new(ServerConfig::new(dir.path())).unwrap();

        ctx1.read(&dir.path().join("a.js")).await.unwrap();
        ctx1.seen_urls.lock().insert("/a.js".to_string());

        assert_eq!(ctx1.file_cache.len(), 1);
        assert_eq!(ctx2.file_cache.len(), 0);
        assert!(!ctx2.seen_urls.lock().contains("/a.js"));
    }
}
