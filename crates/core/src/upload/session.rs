//! Upload session records and lifecycle request/response types.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use stowage_shared::{BackendKind, UploadId};

use super::strategy::UploadStrategy;
use crate::storage::{CompletedPart, RemotePart};

/// Content type used when the client sends none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Durable, write-once record of one upload attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    /// Session primary key.
    pub upload_id: UploadId,
    /// Upload path, fixed for the session's lifetime.
    pub strategy: UploadStrategy,
    /// Owning project.
    pub project_id: String,
    /// Sanitized file name.
    pub file_name: String,
    /// MIME type.
    pub content_type: String,
    /// Declared file size in bytes.
    pub file_size: u64,
    /// Part size chosen at creation.
    pub part_size: u64,
    /// Part count chosen at creation.
    pub total_parts: u32,
    /// Backend kind.
    pub provider_name: BackendKind,
    /// Storage config the session targets; `None` means the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_config_id: Option<String>,
    /// Backend object key.
    pub object_key: String,
    /// Backend multipart id, `S3_MULTIPART` only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_multipart_id: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl UploadSession {
    /// Whether the session is older than `max_age` at `now`.
    #[must_use]
    pub fn is_older_than(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        TimeDelta::from_std(max_age).is_ok_and(|max_age| now - self.created_at > max_age)
    }
}

/// Everything needed to persist a new session; id, part plan and timestamp
/// are assigned by the session store.
#[derive(Debug, Clone)]
pub struct NewSession {
    /// Chosen strategy.
    pub strategy: UploadStrategy,
    /// Owning project.
    pub project_id: String,
    /// Sanitized file name.
    pub file_name: String,
    /// MIME type.
    pub content_type: String,
    /// Declared file size.
    pub file_size: u64,
    /// Backend kind.
    pub provider_name: BackendKind,
    /// Storage config reference.
    pub storage_config_id: Option<String>,
    /// Backend object key.
    pub object_key: String,
    /// Backend multipart id.
    pub remote_multipart_id: Option<String>,
}

/// Input for starting an upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateUpload {
    /// Owning project.
    pub project_id: String,
    /// Client-supplied file name.
    pub file_name: String,
    /// Total size in bytes.
    pub file_size: u64,
    /// MIME type.
    #[serde(default)]
    pub content_type: Option<String>,
    /// Storage config reference.
    #[serde(default)]
    pub storage_config_id: Option<String>,
    /// Prefer one presigned PUT over multipart when the backend allows it.
    #[serde(default)]
    pub prefer_single: bool,
}

/// Acknowledgement of a stored chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkReceipt {
    /// Session the chunk belongs to.
    pub upload_id: UploadId,
    /// Zero-based part index.
    pub part_index: u32,
    /// Bytes stored.
    pub size: u64,
}

/// Session metadata plus received parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadStatus {
    /// The session record.
    pub session: UploadSession,
    /// Received parts: zero-based indices for server-mediated uploads,
    /// one-based part numbers for backend-mediated ones.
    pub uploaded_parts: Vec<u32>,
    /// Backend part details for `S3_MULTIPART` sessions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_parts: Vec<RemotePart>,
}

/// Input for completing an upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompleteUpload {
    /// Part list for `S3_MULTIPART`.
    #[serde(default)]
    pub parts: Option<Vec<CompletedPart>>,
    /// Entity tag returned by the backend for `S3_SINGLE`.
    #[serde(default)]
    pub etag: Option<String>,
}

/// Result of a successful completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedUpload {
    /// Public object URL.
    pub url: String,
    /// Content hash.
    pub content_hash: String,
    /// Backend object key.
    pub object_key: String,
    /// Sanitized file name.
    pub file_name: String,
    /// Object size in bytes.
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(created_at: DateTime<Utc>) -> UploadSession {
        UploadSession {
            upload_id: UploadId::new(),
            strategy: UploadStrategy::LocalChunk,
            project_id: "proj".to_string(),
            file_name: "f.zip".to_string(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            file_size: 25,
            part_size: 10,
            total_parts: 3,
            provider_name: BackendKind::Local,
            storage_config_id: None,
            object_key: "proj/f.zip".to_string(),
            remote_multipart_id: None,
            created_at,
        }
    }

    #[test]
    fn test_is_older_than() {
        let now = Utc::now();
        let old = session(now - TimeDelta::hours(2));
        assert!(old.is_older_than(Duration::from_secs(3600), now));
        assert!(!old.is_older_than(Duration::from_secs(3 * 3600), now));
    }

    #[test]
    fn test_optional_fields_omitted() {
        let json = serde_json::to_value(session(Utc::now())).expect("serialize");
        assert!(json.get("remote_multipart_id").is_none());
        assert_eq!(json["strategy"], "LOCAL_CHUNK");
        assert_eq!(json["provider_name"], "LOCAL");
    }

    #[test]
    fn test_initiate_defaults() {
        let input: InitiateUpload = serde_json::from_str(
            r#"{"project_id": "proj", "file_name": "a.bin", "file_size": 10}"#,
        )
        .expect("valid input");
        assert!(!input.prefer_single);
        assert!(input.content_type.is_none());
        assert!(input.storage_config_id.is_none());
    }
}
