//! Storage request and result types.

use std::collections::HashMap;
use std::path::PathBuf;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Presigned URL for a direct-to-backend request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignedUrl {
    /// The presigned URL.
    pub url: String,
    /// HTTP method to use.
    pub method: String,
    /// When the URL expires.
    pub expires_at: DateTime<Utc>,
    /// Headers the client must send with the request.
    pub headers: HashMap<String, String>,
}

/// Where the bytes of an object come from.
#[derive(Debug, Clone)]
pub enum ObjectSource {
    /// Bytes already in memory.
    Bytes(Bytes),
    /// Files concatenated in the given order.
    Parts(Vec<PathBuf>),
}

/// Request to store an object.
#[derive(Debug, Clone)]
pub struct PutObjectRequest {
    /// Project the object belongs to; first segment of the object key.
    pub project_id: String,
    /// File name; sanitized before it becomes part of the key.
    pub file_name: String,
    /// MIME type.
    pub content_type: String,
    /// Object content.
    pub source: ObjectSource,
}

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Externally visible URL.
    pub url: String,
    /// Content hash: hex SHA-256 for server-written objects, entity tag for
    /// backend-assembled ones.
    pub content_hash: String,
    /// Object key in the backend.
    pub object_key: String,
    /// Size in bytes.
    pub size: u64,
}

/// A part the backend reports as durably received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePart {
    /// One-based part number.
    pub part_number: u32,
    /// Entity tag, quotes stripped.
    pub etag: String,
    /// Part size in bytes.
    pub size: u64,
}

/// A part submitted for multipart completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    /// One-based part number.
    pub part_number: u32,
    /// Entity tag returned by the backend for the part upload.
    pub etag: String,
}

/// Strip the surrounding quotes backends put around entity tags.
#[must_use]
pub fn strip_etag_quotes(etag: &str) -> String {
    etag.trim().trim_matches('"').to_string()
}
