//! Server settings: shared sections plus the upload and storage sections.

use serde::Deserialize;
use stowage_core::storage::{StorageProfiles, StorageProvider};
use stowage_core::upload::UploadConfig;
use stowage_shared::{LoggingConfig, ServerConfig, load_config};

/// Complete server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Log filter and format.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Upload limits and working directories.
    #[serde(default)]
    pub uploads: UploadConfig,
    /// Storage profiles.
    #[serde(default = "default_storage")]
    pub storage: StorageProfiles,
}

fn default_storage() -> StorageProfiles {
    StorageProfiles::single("local", StorageProvider::local_fs("./data/objects"))
}

impl Settings {
    /// Load settings from `config/` files and `STOWAGE__*` variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        load_config()
    }
}
