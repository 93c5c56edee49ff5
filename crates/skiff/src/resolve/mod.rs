//! Specifier and URL resolution.
//!
//! Maps the specifiers found in source code (bare, relative, absolute,
//! aliased, extensionless) onto canonical public paths: server URLs of the
//! form `/path[?query]`, absolute from the server root, with a real file
//! extension. Bare specifiers land under [`MODULE_URL_PREFIX`].

mod bare;

pub use bare::resolve_bare_module;

use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};

/// URL prefix for resolved bare modules.
pub const MODULE_URL_PREFIX: &str = "/@modules/";

/// Extension probe order for extensionless requests. Also the set of
/// extensions treated as JavaScript sources by the rewriter: anything else
/// imported from a module gets the `?import` marker.
pub const RESOLVE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "vue", "json"];

/// How a raw specifier is classified before resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecifierKind {
    Bare,
    Relative,
    Absolute,
    ExternalUrl,
    DataUrl,
}

/// Classify a specifier the way the rewriter dispatches on it.
pub fn classify(specifier: &str) -> SpecifierKind {
    if is_external_url(specifier) {
        SpecifierKind::ExternalUrl
    } else if specifier.starts_with("data:") {
        SpecifierKind::DataUrl
    } else if specifier.starts_with('/') {
        SpecifierKind::Absolute
    } else if specifier.starts_with('.') {
        SpecifierKind::Relative
    } else {
        SpecifierKind::Bare
    }
}

/// `http(s)://` or protocol-relative URLs are left for the browser.
pub fn is_external_url(specifier: &str) -> bool {
    specifier.starts_with("http://")
        || specifier.starts_with("https://")
        || specifier.starts_with("//")
}

/// Strip query and fragment: the canonical module identity.
pub fn clean_url(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}

/// Split a URL into (pathname, query-without-`?`).
pub fn split_query(url: &str) -> (&str, &str) {
    match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    }
}

/// Resolver for one project root.
#[derive(Debug)]
pub struct Resolver {
    root: PathBuf,
    aliases: FxHashMap<String, String>,
}

impl Resolver {
    pub fn new(root: PathBuf, aliases: FxHashMap<String, String>) -> Self {
        Self { root, aliases }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Apply user-defined prefix rewrites. An alias matches the whole
    /// specifier or a prefix ending at a `/` boundary.
    pub fn alias(&self, id: &str) -> String {
        for (from, to) in &self.aliases {
            if id == from {
                return to.clone();
            }
            if let Some(rest) = id.strip_prefix(from.as_str()) {
                if let Some(rest) = rest.strip_prefix('/') {
                    let to = to.trim_end_matches('/');
                    return format!("{to}/{rest}");
                }
            }
        }
        id.to_string()
    }

    /// Merge a relative specifier with its importer's directory.
    /// Absolute ids pass through. Returns (pathname, query-without-`?`).
    pub fn resolve_relative_request(&self, importer: &str, id: &str) -> (String, String) {
        let (path_part, query) = split_query(id);
        let pathname = if path_part.starts_with('/') {
            normalize_segments(path_part)
        } else {
            let dir = match importer.rfind('/') {
                Some(idx) => &importer[..idx],
                None => "",
            };
            normalize_segments(&format!("{dir}/{path_part}"))
        };
        (pathname, query.to_string())
    }

    /// Resolve index files and missing extensions by probing the
    /// filesystem. Probe order: exact, then each extension in
    /// [`RESOLVE_EXTENSIONS`], then `index.<ext>` inside a directory.
    /// Returns the input unchanged when nothing on disk matches.
    pub async fn normalize_public_path(&self, public_path: &str) -> String {
        let file = self.request_to_file(public_path);
        match probe_file(&file).await {
            Some(resolved) if resolved == file => public_path.to_string(),
            Some(resolved) => {
                // Re-derive the public path from the resolved file so the
                // probed suffix carries over.
                self.file_to_request(&resolved)
                    .unwrap_or_else(|| public_path.to_string())
            }
            None => public_path.to_string(),
        }
    }

    /// Public path for a file under the project root.
    ///
    /// Files under `node_modules` come back as `/@modules/...` URLs; files
    /// outside the root have no public path.
    pub fn file_to_request(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let mut url = String::new();
        for component in rel.components() {
            url.push('/');
            url.push_str(&component.as_os_str().to_string_lossy());
        }
        match url.strip_prefix("/node_modules/") {
            Some(rest) => Some(format!("{MODULE_URL_PREFIX}{rest}")),
            None => Some(url),
        }
    }

    /// Filesystem path for a public path (query must already be stripped).
    pub fn request_to_file(&self, public_path: &str) -> PathBuf {
        if let Some(rest) = public_path.strip_prefix(MODULE_URL_PREFIX) {
            return self.root.join("node_modules").join(rest);
        }
        self.root.join(public_path.trim_start_matches('/'))
    }
}

/// Probe a path for a real file: as-is, with appended extensions, then as a
/// directory holding an index file.
pub(crate) async fn probe_file(base: &Path) -> Option<PathBuf> {
    if is_file(base).await {
        return Some(base.to_path_buf());
    }
    let base_str = base.to_string_lossy();
    for ext in RESOLVE_EXTENSIONS {
        let candidate = PathBuf::from(format!("{base_str}.{ext}"));
        if is_file(&candidate).await {
            return Some(candidate);
        }
    }
    for ext in RESOLVE_EXTENSIONS {
        let candidate = base.join(format!("index.{ext}"));
        if is_file(&candidate).await {
            return Some(candidate);
        }
    }
    None
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Fold `.` and `..` segments of a URL path. Never escapes the root.
fn normalize_segments(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    let mut out = String::new();
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}
