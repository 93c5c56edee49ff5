//! Content-type lookup by file extension.

use std::path::Path;

/// MIME type for JavaScript module responses.
pub const JAVASCRIPT: &str = "application/javascript";

/// Default MIME type when the extension is unknown.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Determine the content type for a served file.
///
/// TypeScript and JSX sources are served with a JavaScript content type:
/// the browser consumes them as modules once a transform plugin has run,
/// and the rewrite middleware keys off this type.
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

    match extension {
        "js" | "mjs" | "jsx" | "ts" | "tsx" => JAVASCRIPT,
        "json" => "application/json",
        "map" => "application/json",
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "wasm" => "application/wasm",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "txt" => "text/plain; charset=utf-8",
        _ => OCTET_STREAM,
    }
}
