//! `import.meta.env` module.
//!
//! Modules that mention `import.meta.env` get a prepended import of this
//! generated module; it serializes the configured env values plus the
//! standard dev-mode flags.

use async_trait::async_trait;

use crate::context::ENV_PUBLIC_PATH;
use crate::error::Result;
use crate::pipeline::{Middleware, Next, RequestCtx};

pub struct EnvMiddleware {
    body: String,
}

impl EnvMiddleware {
    pub fn new(env: &serde_json::Map<String, serde_json::Value>) -> Self {
        let mut merged = serde_json::Map::new();
        merged.insert("MODE".into(), "development".into());
        merged.insert("DEV".into(), true.into());
        merged.insert("PROD".into(), false.into());
        for (key, value) in env {
            merged.insert(key.clone(), value.clone());
        }
        let json = serde_json::Value::Object(merged).to_string();
        Self {
            body: format!("export default {json}\n"),
        }
    }
}

#[async_trait]
impl Middleware for EnvMiddleware {
    async fn handle(&self, ctx: &mut RequestCtx, next: Next<'_>) -> Result<()> {
        if ctx.path == ENV_PUBLIC_PATH {
            ctx.set_js_body(self.body.clone());
            return Ok(());
        }
        next.run(ctx).await
    }
}
