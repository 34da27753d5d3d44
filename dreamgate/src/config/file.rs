//! Configuration file handling.
//!
//! Loads the YAML configuration file with sensible defaults. A missing
//! file is not an error; every section and field falls back to its
//! default via `#[serde(default)]`.

use super::settings::GatewayConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// Failed to parse the config file
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Returns the default config file path (`config.yml` in the working dir,
/// overridable via `CONFIG_FILE`).
pub fn config_file_path() -> PathBuf {
    std::env::var("CONFIG_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.yml"))
}

/// Loads configuration from a specific path.
///
/// If the file doesn't exist, returns defaults.
pub fn load_from(path: &Path) -> Result<GatewayConfig, ConfigError> {
    if !path.exists() {
        return Ok(GatewayConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = serde_yaml::from_str(&content)?;
    Ok(config)
}
