//! Storage backend identity.

use serde::{Deserialize, Serialize};

/// The closed set of storage backends an upload can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BackendKind {
    /// Local filesystem.
    Local,
    /// WebDAV server.
    Webdav,
    /// S3-compatible object store.
    S3,
    /// Aliyun OSS.
    Oss,
}

impl BackendKind {
    /// Whether the backend offers native multipart uploads and presigned URLs.
    #[must_use]
    pub const fn supports_native_multipart(self) -> bool {
        match self {
            Self::S3 | Self::Oss => true,
            Self::Local | Self::Webdav => false,
        }
    }

    /// Convert to the stored string value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "LOCAL",
            Self::Webdav => "WEBDAV",
            Self::S3 => "S3",
            Self::Oss => "OSS",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
