//! `/@modules/` server.
//!
//! Serves installed package files for the URLs the rewriter produces from
//! bare specifiers. The rewriter emits fully resolved entries, but direct
//! requests (a hand-written `/@modules/pkg` in a script tag) still get
//! extension normalization.

use async_trait::async_trait;

use crate::cache::file;
use crate::error::Result;
use crate::pipeline::{Middleware, Next, RequestCtx};
use crate::resolve::MODULE_URL_PREFIX;

pub struct ModulesMiddleware;

#[async_trait]
impl Middleware for ModulesMiddleware {
    async fn handle(&self, ctx: &mut RequestCtx, next: Next<'_>) -> Result<()> {
        if !ctx.path.starts_with(MODULE_URL_PREFIX) {
            return next.run(ctx).await;
        }

        let server = ctx.server.clone();
        let public_path = server.resolver.normalize_public_path(&ctx.path).await;
        let path = server.resolver.request_to_file(&public_path);
        file::respond(ctx, &path).await
    }
}
