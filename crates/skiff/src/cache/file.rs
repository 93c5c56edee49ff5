//! File reader cache.
//!
//! Byte-accurate reads memoized on `(mtime, etag, content)`. A cached entry
//! is served as long as the file's mtime is unchanged; any mtime bump
//! triggers a re-read and a fresh ETag over the new bytes.

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::cache::LruMap;
use crate::error::{Result, ServerError};
use crate::mime;
use crate::pipeline::RequestCtx;

/// Maximum number of cached file entries.
pub const FILE_CACHE_CAPACITY: usize = 10_000;

/// One cached file.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// File mtime in epoch milliseconds at read time.
    pub last_modified: u64,
    /// Strong ETag over the content bytes.
    pub etag: String,
    pub content: Arc<Vec<u8>>,
}

/// LRU cache of file reads, keyed by absolute path.
pub struct FileCache {
    inner: Mutex<LruMap<PathBuf, FileEntry>>,
}

impl FileCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LruMap::new(FILE_CACHE_CAPACITY)),
        }
    }

    /// Read a file, serving cached bytes when the mtime is unchanged.
    ///
    /// A missing file maps to `NotFound`, any other failure to `Io`;
    /// neither outcome is cached.
    pub async fn read(&self, path: &Path) -> Result<FileEntry> {
        let meta = tokio::fs::metadata(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ServerError::NotFound(path.to_path_buf())
            } else {
                ServerError::Io(e)
            }
        })?;
        if !meta.is_file() {
            return Err(ServerError::NotFound(path.to_path_buf()));
        }
        let mtime = epoch_millis(meta.modified()?);

        {
            let mut cache = self.inner.lock();
            if let Some(entry) = cache.get(&path.to_path_buf()) {
                if entry.last_modified == mtime {
                    return Ok(entry.clone());
                }
            }
        }

        let bytes = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ServerError::NotFound(path.to_path_buf())
            } else {
                ServerError::Io(e)
            }
        })?;
        let entry = FileEntry {
            last_modified: mtime,
            etag: format!("\"{}\"", blake3::hash(&bytes).to_hex()),
            content: Arc::new(bytes),
        };
        self.inner.lock().put(path.to_path_buf(), entry.clone());
        Ok(entry)
    }

    /// Drop the entry for a path (used on unlink).
    pub fn evict(&self, path: &Path) {
        self.inner.lock().remove(&path.to_path_buf());
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

impl Default for FileCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Serve a file into the request context with HTTP caching headers.
///
/// Sets `Content-Type`, `ETag` and `Last-Modified` (the transport layer adds
/// `Cache-Control: no-cache`). Replies 304 only when the client's
/// `If-None-Match` matches the current ETag AND the URL has already been
/// served once by this process; the seen-URLs check keeps a freshly
/// restarted server from validating a client's ETag against state it never
/// produced.
pub async fn respond(ctx: &mut RequestCtx, path: &Path) -> Result<()> {
    let server = ctx.server.clone();
    let entry = server.read(path).await?;

    ctx.content_type = Some(mime::content_type_for(path).to_string());
    ctx.etag = Some(entry.etag.clone());
    ctx.last_modified = Some(entry.last_modified);

    let seen = server.seen_urls.lock().contains(&ctx.path);
    let etag_matches = ctx.if_none_match.as_deref() == Some(entry.etag.as_str());
    if etag_matches && seen {
        ctx.status = Some(304);
        ctx.body = None;
        return Ok(());
    }

    server.seen_urls.lock().insert(ctx.path.clone());
    ctx.status = Some(200);
    ctx.body = Some(entry.content.as_ref().clone());
    Ok(())
}

fn epoch_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
