//! Request pipeline.
//!
//! Requests flow through an ordered chain of middlewares. A middleware may
//! short-circuit by filling in the response fields, or call `next` and
//! post-process whatever the rest of the chain produced. The import
//! rewriter registers first for exactly that reason: its work happens after
//! `next` returns a JavaScript body.

use async_trait::async_trait;
use std::sync::Arc;

use crate::context::ServerContext;
use crate::error::Result;
use crate::mime;
use crate::resolve::split_query;

/// Per-request state threaded through the middleware chain.
pub struct RequestCtx {
    pub server: Arc<ServerContext>,
    /// Full request URL: path plus query.
    pub url: String,
    /// Pathname only.
    pub path: String,
    /// Query string without the leading `?`; empty when absent.
    pub query: String,
    /// Response status; `None` until a middleware produces a response.
    pub status: Option<u16>,
    pub body: Option<Vec<u8>>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    /// Epoch milliseconds for the `Last-Modified` header.
    pub last_modified: Option<u64>,
    /// Incoming `If-None-Match` header, verbatim.
    pub if_none_match: Option<String>,
}

impl RequestCtx {
    pub fn new(server: Arc<ServerContext>, url: &str, if_none_match: Option<String>) -> Self {
        let (path, query) = split_query(url);
        Self {
            server,
            url: url.to_string(),
            path: path.to_string(),
            query: query.to_string(),
            status: None,
            body: None,
            content_type: None,
            etag: None,
            last_modified: None,
            if_none_match,
        }
    }

    /// Value of one query parameter, if present.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key == name).then_some(value)
        })
    }

    /// The `?t=` version stamp of an HMR-driven refetch.
    pub fn hmr_timestamp(&self) -> Option<u64> {
        self.query_param("t").and_then(|t| t.parse().ok())
    }

    /// Whether the response produced so far is JavaScript.
    pub fn is_js_response(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|t| t.starts_with(mime::JAVASCRIPT))
    }

    /// Set a JavaScript response body.
    pub fn set_js_body(&mut self, body: String) {
        self.status = Some(200);
        self.content_type = Some(mime::JAVASCRIPT.to_string());
        self.body = Some(body.into_bytes());
    }

    /// Read a file through the server's reader cache.
    pub async fn read(&self, path: &std::path::Path) -> Result<crate::cache::file::FileEntry> {
        self.server.read(path).await
    }
}

/// One link in the request chain.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, ctx: &mut RequestCtx, next: Next<'_>) -> Result<()>;
}

/// The remainder of the chain after the current middleware.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    /// Run the rest of the chain. Running past the end is a no-op.
    pub async fn run(self, ctx: &mut RequestCtx) -> Result<()> {
        if let Some((head, rest)) = self.chain.split_first() {
            head.handle(ctx, Next { chain: rest }).await
        } else {
            Ok(())
        }
    }
}

/// An ordered middleware chain.
pub struct Pipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl Pipeline {
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middlewares }
    }

    pub async fn run(&self, ctx: &mut RequestCtx) -> Result<()> {
        Next {
            chain: &self.middlewares,
        }
        .run(ctx)
        .await
    }
}
