//! Import rewriting.
//!
//! The rewrite middleware registers first in the chain and does its work
//! after `next` returns: any JavaScript response body is lexed, its import
//! specifiers are resolved to public paths and rewritten in place, HMR and
//! env preambles are injected, and the module's edges in the import graph
//! are reconciled against what the source actually imports now.
//!
//! Rewriting never fails a request. A body that cannot be lexed, or any
//! internal error mid-rewrite, is logged and the original body is served;
//! the browser then reports the real syntax error instead of the server
//! masking it behind a 500.

pub mod editor;
pub mod lexer;

use async_trait::async_trait;
use rustc_hash::FxHashSet;
use std::sync::Arc;

use crate::cache::rewrite::RewriteCache;
use crate::context::{ServerContext, CLIENT_PUBLIC_PATH, ENV_PUBLIC_PATH};
use crate::error::{Result, ServerError};
use crate::pipeline::{Middleware, Next, RequestCtx};
use crate::resolve::{
    classify, clean_url, resolve_bare_module, SpecifierKind, RESOLVE_EXTENSIONS,
};

use editor::SourceEditor;

/// Middleware that rewrites import specifiers in served JavaScript.
pub struct RewriteMiddleware;

#[async_trait]
impl Middleware for RewriteMiddleware {
    async fn handle(&self, ctx: &mut RequestCtx, next: Next<'_>) -> Result<()> {
        next.run(ctx).await?;

        if !should_rewrite(ctx) {
            return Ok(());
        }
        let Some(body) = ctx.body.as_deref() else {
            return Ok(());
        };
        let Ok(source) = std::str::from_utf8(body) else {
            return Ok(());
        };
        let source = source.to_string();
        let public_path = ctx.path.clone();
        let timestamp = ctx.hmr_timestamp();

        match rewrite_module(&ctx.server, &public_path, timestamp, &source).await {
            Ok(Some(rewritten)) => ctx.body = Some(rewritten.into_bytes()),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!("rewrite of {public_path} failed: {err}; serving original body");
            }
        }
        Ok(())
    }
}

/// The rewriter only touches JavaScript module responses; the embedded
/// client runtime, Vue style sub-requests, and source maps pass through.
fn should_rewrite(ctx: &RequestCtx) -> bool {
    ctx.is_js_response()
        && ctx.path != CLIENT_PUBLIC_PATH
        && ctx.query_param("type") != Some("style")
        && !ctx.path.ends_with(".map")
}

/// Rewrite one module body.
///
/// Returns the rewritten source, or `None` when the body could not be lexed
/// and should be served as-is. `timestamp` is the `?t=` of an HMR-driven
/// refetch; such requests bypass the rewrite cache in both directions so
/// version stamps are recomputed.
pub async fn rewrite_module(
    server: &Arc<ServerContext>,
    public_path: &str,
    timestamp: Option<u64>,
    source: &str,
) -> Result<Option<String>> {
    let is_hmr_refetch = timestamp.is_some();
    let cache_key = RewriteCache::key(public_path, source);
    if !is_hmr_refetch {
        if let Some(cached) = server.rewrite_cache.get(&cache_key) {
            tracing::debug!("rewrite cache hit: {public_path}");
            return Ok(Some(cached.as_ref().clone()));
        }
    }

    let lexed = match lexer::lex_module(public_path, source) {
        Ok(lexed) => lexed,
        Err(err) => {
            tracing::warn!("{err}; serving module untransformed");
            return Ok(None);
        }
    };
    if lexed.dynamic_skipped > 0 {
        tracing::debug!(
            "{public_path}: {} dynamic import(s) with non-literal arguments left untouched",
            lexed.dynamic_skipped
        );
    }

    let importer = clean_url(public_path).to_string();
    let mut editor = SourceEditor::new(source);
    let mut current_importees: FxHashSet<String> = FxHashSet::default();

    for import in &lexed.imports {
        let specifier = import.specifier.as_str();
        if matches!(
            classify(specifier),
            SpecifierKind::ExternalUrl | SpecifierKind::DataUrl
        ) {
            continue;
        }

        let resolved = resolve_import(server, &importer, specifier, timestamp).await;
        if resolved != specifier {
            editor
                .overwrite(import.start, import.end, resolved.clone())
                .map_err(|e| ServerError::Server(format!("bad rewrite span: {e}")))?;
        }

        let importee = clean_url(&resolved);
        if importee.starts_with('/') && importee != importer && importee != CLIENT_PUBLIC_PATH {
            current_importees.insert(importee.to_string());
        }
    }

    if source.contains("import.meta.hot") {
        editor.prepend(format!(
            "import {{ createHotContext }} from \"{CLIENT_PUBLIC_PATH}\"; \
import.meta.hot = createHotContext(\"{importer}\");\n"
        ));
    }
    if source.contains("import.meta.env") {
        editor.prepend(format!(
            "import __ENV__ from \"{ENV_PUBLIC_PATH}\"; import.meta.env = __ENV__;\n"
        ));
    }

    // Accepted dep specifiers are rewritten to their resolved clean ids so
    // the browser runtime can match them against update messages.
    let hot_state = match &lexed.hot_accept {
        Some(accept) => {
            let mut deps = Vec::with_capacity(accept.deps.len());
            for dep in &accept.deps {
                let resolved = resolve_import(server, &importer, &dep.specifier, None).await;
                let clean = clean_url(&resolved).to_string();
                if clean != dep.specifier {
                    editor
                        .overwrite(dep.start, dep.end, clean.clone())
                        .map_err(|e| ServerError::Server(format!("bad rewrite span: {e}")))?;
                }
                deps.push(clean);
            }
            (accept.self_accepting, deps)
        }
        None => (false, Vec::new()),
    };

    let output = editor.into_string();

    {
        let mut graph = server.graph.lock();
        graph.reconcile_importees(&importer, current_importees);
        graph.set_hmr_accepts(&importer, hot_state.0, hot_state.1);
    }

    if !is_hmr_refetch {
        server.rewrite_cache.put(cache_key, output.clone());
    }
    Ok(Some(output))
}

/// Resolve one import specifier to a rewritten URL.
///
/// Alias first; bare specifiers go through the package resolver to a
/// `/@modules/` URL; everything else merges with the importer and gets
/// extensions normalized. Resolved non-JS assets with no query of their own
/// are tagged `?import`. When the request carried a `?t=` stamp, imports of
/// dirty modules inherit it and previously updated modules get their latest
/// version, so the browser's HTTP cache is bypassed exactly where content
/// may have changed.
///
/// Resolution failures degrade: the specifier is returned unchanged and the
/// browser surfaces the failing import.
pub async fn resolve_import(
    server: &Arc<ServerContext>,
    importer: &str,
    specifier: &str,
    timestamp: Option<u64>,
) -> String {
    let aliased = server.resolver.alias(specifier);

    let (pathname, mut query) = match classify(&aliased) {
        SpecifierKind::ExternalUrl | SpecifierKind::DataUrl => return specifier.to_string(),
        SpecifierKind::Bare => {
            match resolve_bare_module(&server.resolver, &server.file_cache, &aliased, importer)
                .await
            {
                Ok(public) => (public, String::new()),
                Err(err) => {
                    tracing::warn!("{err}");
                    return specifier.to_string();
                }
            }
        }
        SpecifierKind::Relative | SpecifierKind::Absolute => {
            let (pathname, query) = server.resolver.resolve_relative_request(importer, &aliased);
            (server.resolver.normalize_public_path(&pathname).await, query)
        }
    };

    if query.is_empty() && !is_js_source(&pathname) {
        query.push_str("import");
    }

    if let Some(ts) = timestamp {
        let stamp = {
            let graph = server.graph.lock();
            if graph.is_dirty(ts, &pathname) {
                Some(ts)
            } else {
                graph.latest_version(&pathname)
            }
        };
        if let Some(t) = stamp {
            if query.is_empty() {
                query = format!("t={t}");
            } else {
                query.push_str(&format!("&t={t}"));
            }
        }
    }

    if query.is_empty() {
        pathname
    } else {
        format!("{pathname}?{query}")
    }
}

/// Does this pathname end in a JavaScript source extension? Paths without
/// any extension are treated as sources; the `?import` marker is only for
/// concrete assets.
fn is_js_source(pathname: &str) -> bool {
    let file_name = pathname.rsplit('/').next().unwrap_or(pathname);
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => RESOLVE_EXTENSIONS.contains(&ext),
        _ => true,
    }
}
