//! Upload strategy selection.

use serde::{Deserialize, Serialize};
use stowage_shared::BackendKind;

/// The fixed upload path chosen once at session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStrategy {
    /// Chunks land on the server and are assembled into the local filesystem.
    LocalChunk,
    /// Chunks land on the server and are assembled into a remote backend.
    ServerChunkToRemote,
    /// Client uploads parts straight to a backend-native multipart upload.
    S3Multipart,
    /// Client uploads the whole object with one presigned PUT.
    S3Single,
}

impl UploadStrategy {
    /// Whether chunk bytes flow through the application server.
    #[must_use]
    pub const fn is_server_mediated(self) -> bool {
        matches!(self, Self::LocalChunk | Self::ServerChunkToRemote)
    }

    /// Convert to the stored string value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalChunk => "LOCAL_CHUNK",
            Self::ServerChunkToRemote => "SERVER_CHUNK_TO_REMOTE",
            Self::S3Multipart => "S3_MULTIPART",
            Self::S3Single => "S3_SINGLE",
        }
    }
}

impl std::fmt::Display for UploadStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations whose legality depends on the session strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOperation {
    /// Push one chunk through the server.
    UploadChunk,
    /// Presign one multipart part.
    PresignPart,
    /// Presign a whole-object PUT.
    PresignSingle,
}

impl UploadOperation {
    /// Whether the operation is legal for a strategy.
    #[must_use]
    pub const fn allowed_for(self, strategy: UploadStrategy) -> bool {
        match self {
            Self::UploadChunk => strategy.is_server_mediated(),
            Self::PresignPart => matches!(strategy, UploadStrategy::S3Multipart),
            Self::PresignSingle => matches!(strategy, UploadStrategy::S3Single),
        }
    }

    /// Operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UploadChunk => "upload_chunk",
            Self::PresignPart => "presign_part",
            Self::PresignSingle => "presign_single",
        }
    }
}

impl std::fmt::Display for UploadOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a backend and the client's single-shot preference to a strategy.
#[must_use]
pub const fn select_strategy(backend: BackendKind, prefer_single: bool) -> UploadStrategy {
    if backend.supports_native_multipart() {
        return if prefer_single {
            UploadStrategy::S3Single
        } else {
            UploadStrategy::S3Multipart
        };
    }
    match backend {
        BackendKind::Local => UploadStrategy::LocalChunk,
        _ => UploadStrategy::ServerChunkToRemote,
    }
}
