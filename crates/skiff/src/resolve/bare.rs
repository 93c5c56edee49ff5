//! Bare specifier resolution.
//!
//! Maps `"vue"` or `"pkg/sub"` to a URL under `/@modules/` by reading the
//! installed package's manifest. Entry selection prefers the `module` field
//! (an ES module the browser can actually run) and falls back to `main`.

use std::path::Path;

use crate::cache::file::FileCache;
use crate::error::{Result, ServerError};

use super::{probe_file, Resolver, MODULE_URL_PREFIX};

/// Resolve a bare specifier to its `/@modules/` public path.
///
/// Subpath imports (`pkg/sub`) bypass the manifest and resolve directly
/// against the package directory, with the usual extension and index
/// probing. The manifest itself is read through the file cache so repeated
/// resolutions of the same package stay cheap.
pub async fn resolve_bare_module(
    resolver: &Resolver,
    files: &FileCache,
    id: &str,
    importer: &str,
) -> Result<String> {
    let (pkg, subpath) = split_package_specifier(id);
    let pkg_dir = resolver.root().join("node_modules").join(pkg);

    let candidate = match subpath {
        Some(sub) => pkg_dir.join(sub),
        None => pkg_dir.join(read_entry_field(files, &pkg_dir).await),
    };

    let resolved = probe_file(&candidate)
        .await
        .ok_or_else(|| ServerError::Resolve {
            specifier: id.to_string(),
            importer: importer.to_string(),
        })?;

    module_public_path(resolver.root(), &resolved).ok_or_else(|| ServerError::Resolve {
        specifier: id.to_string(),
        importer: importer.to_string(),
    })
}

/// Split `@scope/pkg/sub/path` into (`@scope/pkg`, Some(`sub/path`)).
fn split_package_specifier(id: &str) -> (&str, Option<&str>) {
    let segments: Vec<&str> = id.splitn(3, '/').collect();
    if id.starts_with('@') {
        match segments.as_slice() {
            [scope, name, rest] => {
                let pkg_len = scope.len() + 1 + name.len();
                (&id[..pkg_len], Some(rest))
            }
            _ => (id, None),
        }
    } else {
        match segments.as_slice() {
            [_pkg] => (id, None),
            [pkg, ..] => (pkg, Some(&id[pkg.len() + 1..])),
            [] => (id, None),
        }
    }
}

/// Entry file from the manifest: `module`, then `main`, then `index.js`.
/// A missing or unparseable manifest falls back to `index.js`; the probe
/// below decides whether anything is actually there.
async fn read_entry_field(files: &FileCache, pkg_dir: &Path) -> String {
    let entry = async {
        let manifest = files.read(&pkg_dir.join("package.json")).await.ok()?;
        let manifest: serde_json::Value = serde_json::from_slice(&manifest.content).ok()?;
        manifest
            .get("module")
            .and_then(|v| v.as_str())
            .or_else(|| manifest.get("main").and_then(|v| v.as_str()))
            .map(str::to_string)
    };
    entry.await.unwrap_or_else(|| "index.js".to_string())
}

fn module_public_path(root: &Path, resolved: &Path) -> Option<String> {
    let rel = resolved.strip_prefix(root.join("node_modules")).ok()?;
    let mut url = String::from(MODULE_URL_PREFIX.trim_end_matches('/'));
    for component in rel.components() {
        url.push('/');
        url.push_str(&component.as_os_str().to_string_lossy());
    }
    Some(url)
}
