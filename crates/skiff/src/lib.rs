//! skiff: a no-bundle ES module development server.
//!
//! Browsers load the source tree directly as native ES modules; skiff
//! intercepts each module request, rewrites import specifiers into
//! server-resolvable URLs, tracks the import graph, and pushes fine-grained
//! hot-module-replacement updates over a websocket when files change.
//!
//! The crate is organized around the request path and the watch path:
//!
//! - [`pipeline`] runs requests through an ordered middleware chain;
//!   [`rewrite`] is the first-registered middleware and transforms every
//!   JavaScript response after the rest of the chain produced it.
//! - [`resolve`] turns specifiers into public paths, [`cache`] memoizes
//!   raw reads and rewritten output, [`graph`] records importer/importee
//!   relations.
//! - [`watch`] feeds file changes into [`hmr`], which walks the graph for
//!   accept boundaries and broadcasts typed updates to clients.

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod hmr;
pub mod logging;
pub mod mime;
pub mod pipeline;
pub mod plugins;
pub mod resolve;
pub mod rewrite;
pub mod server;
pub mod watch;

pub use config::ServerConfig;
pub use context::{ServerContext, CLIENT_PUBLIC_PATH, ENV_PUBLIC_PATH, HMR_PATH};
pub use error::{ConfigError, Result, ServerError};
pub use pipeline::{Middleware, Next, Pipeline, RequestCtx};
pub use plugins::{Plugin, PluginSetup};
pub use server::Server;
