//! HTTP server assembly.
//!
//! axum carries the transport: one websocket route for HMR and a fallback
//! that runs every other request through the middleware pipeline. The
//! pipeline itself stays transport-free so tests can drive it directly.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ServerConfig;
use crate::context::{ServerContext, HMR_PATH};
use crate::error::{Result, ServerError};
use crate::hmr::ws;
use crate::mime;
use crate::pipeline::{Pipeline, RequestCtx};
use crate::plugins::{
    client::ClientMiddleware, env::EnvMiddleware, modules::ModulesMiddleware,
    serve_static::StaticMiddleware, Plugin, PluginSetup,
};
use crate::rewrite::RewriteMiddleware;
use crate::watch;

pub(crate) type AppState = (Arc<ServerContext>, Arc<Pipeline>);

/// The development server.
pub struct Server {
    config: ServerConfig,
    plugins: Vec<Plugin>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            plugins: Vec::new(),
        }
    }

    /// Register a plugin. Plugins run at setup, in registration order,
    /// after the rewrite middleware and before the built-in leaf handlers.
    pub fn with_plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Bind and serve until the process exits.
    pub async fn listen(self) -> Result<()> {
        let ctx = ServerContext::new(self.config)?;
        watch::start(&ctx)?;

        let pipeline = Arc::new(build_pipeline(&ctx, self.plugins));
        let app = router(ctx.clone(), pipeline);

        let addr = SocketAddr::from(([127, 0, 0, 1], ctx.config.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Server(format!("failed to bind {addr}: {e}")))?;

        tracing::info!("dev server running at http://{addr}");
        tracing::info!("serving {}", ctx.root.display());

        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Server(e.to_string()))?;
        Ok(())
    }
}

/// Assemble the middleware chain: rewriter first (it post-processes), then
/// user plugins, then the built-in leaf handlers, static files last.
pub fn build_pipeline(ctx: &Arc<ServerContext>, plugins: Vec<Plugin>) -> Pipeline {
    let mut setup = PluginSetup::new(ctx.clone());
    setup.use_middleware(RewriteMiddleware);
    for plugin in plugins {
        plugin(&mut setup);
    }
    setup.use_middleware(EnvMiddleware::new(&ctx.config.env));
    setup.use_middleware(ModulesMiddleware);
    setup.use_middleware(ClientMiddleware);
    setup.use_middleware(StaticMiddleware);
    Pipeline::new(setup.into_middlewares())
}

fn router(ctx: Arc<ServerContext>, pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route(HMR_PATH, get(ws::websocket_handler))
        .fallback(handle_request)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state((ctx, pipeline))
}

async fn handle_request(
    State((ctx, pipeline)): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let url = match uri.query() {
        Some(query) => format!("{}?{}", uri.path(), query),
        None => uri.path().to_string(),
    };
    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut request = RequestCtx::new(ctx, &url, if_none_match);
    let result = pipeline.run(&mut request).await;
    into_response(request, result)
}

/// Turn the pipeline outcome into an HTTP response.
pub fn into_response(ctx: RequestCtx, result: Result<()>) -> Response {
    let rsp = match result {
        Err(err) => {
            let status = err.status_code();
            if status >= 500 {
                tracing::error!("{}: {err}", ctx.path);
            } else {
                tracing::debug!("{}: {err}", ctx.path);
            }
            return Response::builder()
                .status(StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
                .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(Body::from(err.to_string()))
                .unwrap();
        }
        Ok(()) => ctx,
    };

    let status = rsp
        .status
        .unwrap_or(if rsp.body.is_some() { 200 } else { 404 });
    if status == 404 && rsp.body.is_none() {
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Body::from(format!("Not found: {}", rsp.path)))
            .unwrap();
    }

    let mut builder = Response::builder()
        .status(StatusCode::from_u16(status).unwrap_or(StatusCode::OK))
        .header(header::CACHE_CONTROL, "no-cache");
    if let Some(etag) = &rsp.etag {
        builder = builder.header(header::ETAG, etag);
    }
    if let Some(millis) = rsp.last_modified {
        builder = builder.header(header::LAST_MODIFIED, http_date(millis));
    }

    if status == 304 {
        return builder.body(Body::empty()).unwrap();
    }

    let content_type = rsp
        .content_type
        .unwrap_or_else(|| mime::OCTET_STREAM.to_string());
    builder = builder.header(header::CONTENT_TYPE, content_type);
    builder.body(Body::from(rsp.body.unwrap_or_default())).unwrap()
}

fn http_date(millis: u64) -> String {
    chrono::DateTime::from_timestamp_millis(millis as i64)
        .unwrap_or_default()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}
