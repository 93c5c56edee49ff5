//! Config file loading.
//!
//! `skiff.config.json` in the project root (or wherever `--config` points)
//! carries the optional settings: port, aliases, env values, watch
//! exclusions. Any problem reading or parsing it is fatal at startup.

use std::path::{Path, PathBuf};

use skiff::{ConfigError, ServerConfig};

/// Default config file name, looked up relative to the project root.
pub const CONFIG_FILE: &str = "skiff.config.json";

/// Load the server configuration for a project root.
///
/// With `--config`, the named file must exist and parse. Without it, a
/// missing `skiff.config.json` just means defaults.
pub fn load(root: PathBuf, explicit: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    let mut config = match explicit {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            serde_json::from_str::<ServerConfig>(&raw)?
        }
        None => {
            let path = root.join(CONFIG_FILE);
            if path.is_file() {
                let raw = std::fs::read_to_string(&path)?;
                serde_json::from_str::<ServerConfig>(&raw)?
            } else {
                ServerConfig::default()
            }
        }
    };

    config.root = root;
    Ok(config)
}
