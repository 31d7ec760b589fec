//! Config loading and the locations it is looked up in.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::Config;
use crate::error::DaemonError;

/// Load configuration from the given path, or the default location.
///
/// An explicit path must exist; a missing default file means defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config, DaemonError> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(DaemonError::Config(format!(
                    "config file {} not found",
                    p.display()
                )));
            }
            p.to_path_buf()
        }
        None => default_config_path(),
    };

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| DaemonError::Config(format!("failed to read config: {e}")))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| DaemonError::Config(format!("failed to parse config: {e}")))?;
        info!(path = %config_path.display(), "loaded config");
        Ok(config)
    } else {
        info!("no config file found, using defaults");
        Ok(Config::default())
    }
}

/// Get the default config directory path.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("opoznienia")
}

/// Get the default config file path.
pub fn default_config_path() -> PathBuf {
    config_dir().join("config.toml")
}
