//! Built-in middlewares and the plugin contract.
//!
//! A plugin is a function over [`PluginSetup`]: it registers middlewares
//! (and may grab the server context for watcher listeners or config)
//! synchronously at startup. Extensibility comes from registering handlers
//! in the chain, nothing else. Out-of-scope collaborators (single-file
//! component compilers, CSS/JSON wrappers, proxies) plug in here.

pub mod client;
pub mod env;
pub mod modules;
pub mod serve_static;

use std::sync::Arc;

use crate::context::ServerContext;
use crate::pipeline::Middleware;

/// Registration-time view of the server handed to each plugin.
pub struct PluginSetup {
    server: Arc<ServerContext>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl PluginSetup {
    pub fn new(server: Arc<ServerContext>) -> Self {
        Self {
            server,
            middlewares: Vec::new(),
        }
    }

    pub fn server(&self) -> &Arc<ServerContext> {
        &self.server
    }

    /// Append a middleware to the chain. Registration order is execution
    /// order; post-processing therefore runs in reverse.
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middlewares.push(Arc::new(middleware));
    }

    /// Register a listener for filesystem change events. Listeners run
    /// before the built-in invalidation for each event.
    pub fn on_change(&mut self, listener: impl Fn(&crate::watch::FileChange) + Send + Sync + 'static) {
        self.server.watch_listeners.lock().push(Box::new(listener));
    }

    pub fn into_middlewares(self) -> Vec<Arc<dyn Middleware>> {
        self.middlewares
    }
}

/// A server plugin: runs once at setup.
pub type Plugin = Box<dyn FnOnce(&mut PluginSetup) + Send>;
