//! Storage error types.

use stowage_shared::BackendKind;
use thiserror::Error;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Object not found in storage.
    #[error("object not found: {key}")]
    NotFound {
        /// Storage key that was not found.
        key: String,
    },

    /// No storage profile is registered under the given ID.
    #[error("unknown storage config: {0}")]
    UnknownProfile(String),

    /// Native multipart or presigning requested from a backend without it.
    #[error("native multipart upload not supported by {backend} backend")]
    MultipartNotSupported {
        /// Backend that was asked.
        backend: BackendKind,
    },

    /// Storage provider configuration error.
    #[error("storage configuration error: {0}")]
    Configuration(String),

    /// OpenDAL operation error.
    #[error("storage operation failed: {0}")]
    Operation(String),

    /// Remote object store API error.
    #[error("remote storage request failed: {0}")]
    Remote(String),

    /// Invalid storage key format.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    /// Local I/O error while reading part files.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Create a not found error.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create an unknown profile error.
    #[must_use]
    pub fn unknown_profile(id: impl Into<String>) -> Self {
        Self::UnknownProfile(id.into())
    }

    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an operation error.
    #[must_use]
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }

    /// Create a remote API error.
    #[must_use]
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }
}

impl From<opendal::Error> for StorageError {
    fn from(err: opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::NotFound => Self::NotFound {
                key: err.to_string(),
            },
            opendal::ErrorKind::ConfigInvalid => Self::Configuration(err.to_string()),
            _ => Self::Operation(err.to_string()),
        }
    }
}
