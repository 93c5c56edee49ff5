//! Static file server. Terminal middleware: everything that reaches it is
//! served from the project root through the reader cache, with conditional
//! request support. `/` falls back to the HTML entry.

use async_trait::async_trait;

use crate::cache::file;
use crate::error::Result;
use crate::pipeline::{Middleware, Next, RequestCtx};

pub struct StaticMiddleware;

#[async_trait]
impl Middleware for StaticMiddleware {
    async fn handle(&self, ctx: &mut RequestCtx, _next: Next<'_>) -> Result<()> {
        let public_path = if ctx.path == "/" {
            "/index.html"
        } else {
            ctx.path.as_str()
        };
        let path = ctx.server.resolver.request_to_file(public_path);
        file::respond(ctx, &path).await
    }
}
