//! Configuration for the gateway.
//!
//! Configuration is layered: compiled-in defaults, then an optional YAML
//! file, then environment variables (env wins). Settings structs live in
//! [`settings`], constants in [`defaults`], file loading in [`file`], and
//! the environment overlay in [`env`].

mod defaults;
mod env;
mod file;
mod settings;

pub use defaults::*;
pub use env::apply_env_overrides;
pub use file::{config_file_path, ConfigError};
pub use settings::{
    GatewayConfig, GenerationSettings, LoggingSettings, MirrorSettings, ProxySettings,
    QuotaSettings, ServerSettings, TaskSettings,
};

impl GatewayConfig {
    /// Loads configuration from the default file path and the environment.
    ///
    /// Missing file means defaults; environment variables always win.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = file::load_from(&config_file_path())?;
        apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Loads configuration from a specific YAML file and the environment.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = file::load_from(path)?;
        apply_env_overrides(&mut config);
        Ok(config)
    }
}
