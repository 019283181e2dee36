//! Remote multipart coordinator for backend-mediated uploads.
//!
//! Part bytes never pass through the server: clients upload with presigned
//! URLs and the server only lists, completes or aborts. The backend's part
//! listing is authoritative for status.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, instrument};

use super::error::{UploadError, UploadResult};
use super::session::UploadSession;
use crate::storage::{
    CompletedPart, MultipartBackend, PresignedUrl, RemotePart, StorageError, StoredObject,
    strip_etag_quotes,
};

/// Validate a client part list and sort it by part number.
///
/// The list must name every part `1..=total_parts` exactly once.
pub fn validate_completed_parts(
    mut parts: Vec<CompletedPart>,
    total_parts: u32,
) -> UploadResult<Vec<CompletedPart>> {
    if parts.is_empty() {
        return Err(UploadError::validation("part list must not be empty"));
    }

    let mut seen = HashSet::with_capacity(parts.len());
    for part in &mut parts {
        if part.part_number == 0 || part.part_number > total_parts {
            return Err(UploadError::validation(format!(
                "part number {} out of range 1..={total_parts}",
                part.part_number
            )));
        }
        if !seen.insert(part.part_number) {
            return Err(UploadError::validation(format!(
                "duplicate part number {}",
                part.part_number
            )));
        }
        part.etag = part.etag.trim().to_string();
        if part.etag.is_empty() {
            return Err(UploadError::validation(format!(
                "part {} has an empty etag",
                part.part_number
            )));
        }
    }

    if seen.len() != total_parts as usize {
        let missing: Vec<u32> = (1..=total_parts).filter(|n| !seen.contains(n)).collect();
        return Err(UploadError::validation(format!(
            "missing part numbers {missing:?} of {total_parts}"
        )));
    }

    parts.sort_by_key(|part| part.part_number);
    Ok(parts)
}

/// Drives one session's backend-native upload.
pub struct MultipartCoordinator<'a> {
    backend: &'a dyn MultipartBackend,
    presign_ttl: Duration,
}

impl<'a> MultipartCoordinator<'a> {
    /// Create a coordinator issuing URLs valid for `presign_ttl`.
    #[must_use]
    pub fn new(backend: &'a dyn MultipartBackend, presign_ttl: Duration) -> Self {
        Self {
            backend,
            presign_ttl,
        }
    }

    fn multipart_id(session: &UploadSession) -> UploadResult<&str> {
        session.remote_multipart_id.as_deref().ok_or_else(|| {
            UploadError::RemoteProvider(format!(
                "session {} has no remote multipart id",
                session.upload_id
            ))
        })
    }

    /// Start the backend multipart upload for a new session.
    pub async fn begin(&self, object_key: &str, content_type: &str) -> UploadResult<String> {
        self.backend
            .create_multipart(object_key, content_type)
            .await
            .map_err(|e| UploadError::RemoteProvider(e.to_string()))
    }

    /// Presigned `UploadPart` URL for a one-based part number.
    pub async fn presign_part(
        &self,
        session: &UploadSession,
        part_number: u32,
    ) -> UploadResult<PresignedUrl> {
        if part_number == 0 || part_number > session.total_parts {
            return Err(UploadError::validation(format!(
                "part number {part_number} out of range 1..={}",
                session.total_parts
            )));
        }
        let multipart_id = Self::multipart_id(session)?;
        Ok(self
            .backend
            .presign_upload_part(&session.object_key, multipart_id, part_number, self.presign_ttl)
            .await?)
    }

    /// Presigned whole-object PUT URL.
    pub async fn presign_single(&self, session: &UploadSession) -> UploadResult<PresignedUrl> {
        Ok(self
            .backend
            .presign_put(&session.object_key, &session.content_type, self.presign_ttl)
            .await?)
    }

    /// Parts the backend has received.
    pub async fn remote_parts(&self, session: &UploadSession) -> UploadResult<Vec<RemotePart>> {
        let multipart_id = Self::multipart_id(session)?;
        self.backend
            .list_parts(&session.object_key, multipart_id)
            .await
            .map_err(|e| UploadError::RemoteProvider(e.to_string()))
    }

    /// Whether the single-shot object exists in the backend.
    pub async fn single_uploaded(&self, session: &UploadSession) -> UploadResult<bool> {
        match self.backend.head_object(&session.object_key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Complete the multipart upload with a validated part list.
    ///
    /// A backend rejection leaves the remote upload intact.
    #[instrument(skip_all, fields(upload_id = %session.upload_id, parts = parts.len()))]
    pub async fn complete(
        &self,
        session: &UploadSession,
        parts: Vec<CompletedPart>,
    ) -> UploadResult<StoredObject> {
        let multipart_id = Self::multipart_id(session)?;
        let parts = validate_completed_parts(parts, session.total_parts)?;

        let etag = self
            .backend
            .complete_multipart(&session.object_key, multipart_id, &parts)
            .await
            .map_err(|e| UploadError::RemoteProvider(e.to_string()))?;
        debug!(object_key = %session.object_key, "Multipart upload completed");

        Ok(StoredObject {
            url: self.backend.object_url(&session.object_key),
            content_hash: etag,
            object_key: session.object_key.clone(),
            size: session.file_size,
        })
    }

    /// Complete a single-shot upload.
    ///
    /// The entity tag from the client's PUT response becomes the content hash;
    /// without one the object is looked up. Size and content are not verified.
    pub async fn complete_single(
        &self,
        session: &UploadSession,
        etag: Option<&str>,
    ) -> UploadResult<StoredObject> {
        let (content_hash, size) = match etag.map(strip_etag_quotes).filter(|e| !e.is_empty()) {
            Some(etag) => (etag, session.file_size),
            None => match self.backend.head_object(&session.object_key).await {
                Ok(head) => (head.etag, head.size),
                Err(StorageError::NotFound { .. }) => {
                    return Err(UploadError::IncompleteUpload {
                        uploaded: Vec::new(),
                        total_parts: 1,
                    });
                }
                Err(e) => return Err(e.into()),
            },
        };

        Ok(StoredObject {
            url: self.backend.object_url(&session.object_key),
            content_hash,
            object_key: session.object_key.clone(),
            size,
        })
    }

    /// Abort the backend multipart upload. An upload the backend no longer
    /// knows counts as aborted.
    pub async fn abort(&self, session: &UploadSession) -> Result<(), StorageError> {
        let Some(multipart_id) = session.remote_multipart_id.as_deref() else {
            return Ok(());
        };
        match self
            .backend
            .abort_multipart(&session.object_key, multipart_id)
            .await
        {
            Ok(()) | Err(StorageError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
