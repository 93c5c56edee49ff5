//! Error types for the dev server.
//!
//! The taxonomy maps directly onto HTTP responses: `NotFound` becomes a 404,
//! `Resolve` and `Io` become 500s that name what went wrong, and `Parse` is
//! swallowed by the rewriter (a module that fails to lex is served
//! untransformed so the browser reports the syntax error, not the server).
//! `Config` is only raised at startup and is fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level server error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Requested file does not exist.
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A served module could not be lexed.
    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    /// An import specifier could not be resolved.
    #[error("Failed to resolve \"{specifier}\" imported by {importer}")]
    Resolve { specifier: String, importer: String },

    /// I/O errors from file system operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File watcher errors.
    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// Startup configuration errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Server transport errors (bind, accept).
    #[error("Server error: {0}")]
    Server(String),
}

impl ServerError {
    /// HTTP status code this error maps to when it reaches a response.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::NotFound(_) => 404,
            _ => 500,
        }
    }
}

/// Configuration errors. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Project root does not exist or is not a directory.
    #[error("Project root not found: {}", .0.display())]
    RootNotFound(PathBuf),

    /// Config file has invalid JSON syntax.
    #[error("Invalid JSON in config file: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Invalid value for a configuration option.
    #[error("Invalid value for '{field}': {value}")]
    InvalidValue { field: String, value: String },

    /// I/O error while reading config.
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using `ServerError` as the default error type.
pub type Result<T, E = ServerError> = std::result::Result<T, E>;
