//! HMR client runtime.
//!
//! Serves the embedded browser-side runtime that connects to the HMR
//! websocket and applies updates. The rewriter deliberately skips this
//! module, so it must not rely on any rewriting.

use async_trait::async_trait;

use crate::context::CLIENT_PUBLIC_PATH;
use crate::error::Result;
use crate::mime;
use crate::pipeline::{Middleware, Next, RequestCtx};

const CLIENT_RUNTIME: &str = include_str!("../../assets/client.js");

pub struct ClientMiddleware;

#[async_trait]
impl Middleware for ClientMiddleware {
    async fn handle(&self, ctx: &mut RequestCtx, next: Next<'_>) -> Result<()> {
        if ctx.path == CLIENT_PUBLIC_PATH {
            ctx.status = Some(200);
            ctx.content_type = Some(mime::JAVASCRIPT.to_string());
            ctx.body = Some(CLIENT_RUNTIME.as_bytes().to_vec());
            return Ok(());
        }
        next.run(ctx).await
    }
}
