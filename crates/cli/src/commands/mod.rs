pub mod chat;
pub mod init;
pub mod profile;
pub mod serve;
pub mod status;

use diarist_config::AppConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Load the config from `path`, or the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    debug!(path = %config_file(path).display(), "Loading config");
    let config = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}

pub fn config_file(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}
