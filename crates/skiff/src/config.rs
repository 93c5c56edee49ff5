//! Server configuration.

use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::path::PathBuf;

fn default_port() -> u16 {
    3000
}

/// Configuration for one server instance.
///
/// The deserializable fields match the optional `skiff.config.json` the CLI
/// loads; `root` is always supplied programmatically.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Project root directory. Everything under it (minus excluded
    /// directories) is watched and servable.
    #[serde(skip)]
    pub root: PathBuf,

    /// Port to bind on localhost.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Specifier prefix rewrites applied before resolution,
    /// e.g. `"@": "/src"`.
    #[serde(default)]
    pub aliases: FxHashMap<String, String>,

    /// Values exposed to modules through `import.meta.env`.
    #[serde(default)]
    pub env: serde_json::Map<String, serde_json::Value>,

    /// Extra path patterns the watcher ignores, on top of the built-in
    /// `node_modules` and `.git`.
    #[serde(default)]
    pub watch_exclude: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            port: default_port(),
            aliases: FxHashMap::default(),
            env: serde_json::Map::new(),
            watch_exclude: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Config rooted at the given directory, defaults everywhere else.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }
}
