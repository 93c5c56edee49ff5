//! Rewritten-output cache.
//!
//! Keyed on `public path + content hash of the raw body`, so an entry is
//! only ever hit while the exact source bytes that produced it are being
//! served. File changes evict by public-path prefix: the raw bytes may have
//! been re-read before eviction runs, so re-deriving the composite key would
//! miss the stale entry.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::cache::LruMap;

/// Maximum number of cached rewrites.
pub const REWRITE_CACHE_CAPACITY: usize = 1_024;

/// Cache of rewritten module bodies.
pub struct RewriteCache {
    inner: Mutex<LruMap<String, Arc<String>>>,
}

impl RewriteCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LruMap::new(REWRITE_CACHE_CAPACITY)),
        }
    }

    /// Content-addressed key for a (public path, raw body) pair.
    ///
    /// The public path is a literal prefix of the key; `evict_prefix`
    /// depends on that.
    pub fn key(public_path: &str, body: &str) -> String {
        format!("{public_path}\u{0}{}", blake3::hash(body.as_bytes()).to_hex())
    }

    pub fn get(&self, key: &str) -> Option<Arc<String>> {
        self.inner.lock().get(&key.to_string()).cloned()
    }

    pub fn put(&self, key: String, body: String) {
        self.inner.lock().put(key, Arc::new(body));
    }

    /// Drop every entry belonging to a public path.
    pub fn evict_prefix(&self, public_path: &str) -> usize {
        let prefix = format!("{public_path}\u{0}");
        self.inner.lock().remove_matching(|k| k.starts_with(&prefix))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

impl Default for RewriteCache {
    fn default() -> Self {
        Self::new()
    }
}
