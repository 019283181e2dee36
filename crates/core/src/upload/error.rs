//! Upload error types.

use stowage_shared::UploadId;
use thiserror::Error;

use super::kv::KvError;
use super::strategy::{UploadOperation, UploadStrategy};
use crate::storage::StorageError;

/// Upload lifecycle errors.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Malformed parameters, out-of-range index or oversized file.
    #[error("{0}")]
    Validation(String),

    /// Unknown or already-removed upload session.
    #[error("upload session not found: {0}")]
    SessionNotFound(UploadId),

    /// Operation not supported by the session's strategy.
    #[error("{operation} is not available for {strategy} uploads")]
    StrategyMismatch {
        /// Strategy of the session.
        strategy: UploadStrategy,
        /// Operation that was attempted.
        operation: UploadOperation,
    },

    /// Completion requested before every part is present.
    #[error("upload incomplete: {} of {total_parts} parts received", uploaded.len())]
    IncompleteUpload {
        /// Part indices currently present, ascending.
        uploaded: Vec<u32>,
        /// Parts the session expects.
        total_parts: u32,
    },

    /// The backend rejected a multipart request; the remote upload is intact.
    #[error("remote provider rejected the request: {0}")]
    RemoteProvider(String),

    /// Another completion or abort currently owns the session.
    #[error("upload {0} is already being finalized")]
    Finalizing(UploadId),

    /// Backend I/O failure.
    #[error(transparent)]
    Storage(StorageError),

    /// Session persistence failure.
    #[error("session store error: {0}")]
    Store(#[from] KvError),
}

impl UploadError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::UnknownProfile(id) => {
                Self::Validation(format!("unknown storage config: {id}"))
            }
            StorageError::InvalidKey(key) => Self::Validation(format!("invalid object key: {key}")),
            other => Self::Storage(other),
        }
    }
}

/// Result type for upload operations.
pub type UploadResult<T> = Result<T, UploadError>;
