//! Application configuration management.
//!
//! Sections owned by this crate (`server`, `logging`) are plain serde structs.
//! Binaries compose them with domain sections and load everything through
//! [`load_config`], which applies the same layering everywhere.

use std::collections::HashMap;

use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Environment variable prefix, e.g. `STOWAGE__SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "STOWAGE";

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives used when `RUST_LOG` is not set.
    #[serde(default)]
    pub filter: Option<String>,
    /// Emit JSON lines instead of human readable output.
    #[serde(default)]
    pub json: bool,
}

impl LoggingConfig {
    /// Default filter directives.
    pub const DEFAULT_FILTER: &'static str = "stowage=debug,tower_http=debug";

    /// Returns the configured filter or the default one.
    #[must_use]
    pub fn filter_or_default(&self) -> &str {
        self.filter.as_deref().unwrap_or(Self::DEFAULT_FILTER)
    }
}

/// Loads configuration from config files and the environment.
///
/// Sources, later ones overriding earlier ones:
/// 1. `config/default.{toml,...}` (optional)
/// 2. `config/{RUN_MODE}.{toml,...}` (optional, `RUN_MODE` defaults to `development`)
/// 3. `STOWAGE__SECTION__KEY` environment variables
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded or deserialized into `T`.
pub fn load_config<T: DeserializeOwned>() -> Result<T, config::ConfigError> {
    build(None)
}

/// Same layering as [`load_config`], but the `STOWAGE__*` variables are read
/// from `vars` instead of the process environment.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded or deserialized into `T`.
pub fn load_config_from<T: DeserializeOwned>(
    vars: HashMap<String, String>,
) -> Result<T, config::ConfigError> {
    build(Some(vars))
}

fn build<T: DeserializeOwned>(
    vars: Option<HashMap<String, String>>,
) -> Result<T, config::ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

    let config = config::Config::builder()
        .add_source(config::File::with_name("config/default").required(false))
        .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .source(vars),
        )
        .build()?;

    config.try_deserialize()
}
