//! Assembler for server-mediated uploads.

use tracing::{debug, instrument};

use super::chunks::ChunkStore;
use super::error::{UploadError, UploadResult};
use super::session::UploadSession;
use crate::storage::{ObjectSource, ObjectStore, PutObjectRequest, StoredObject};

/// Whether `uploaded` is exactly `0..total_parts`.
fn is_complete(uploaded: &[u32], total_parts: u32) -> bool {
    uploaded.len() == total_parts as usize
        && uploaded
            .iter()
            .zip(0..total_parts)
            .all(|(&index, expected)| index == expected)
}

/// Concatenate a session's parts in index order into the object store.
///
/// Fails with `IncompleteUpload` carrying the present indices when any part
/// is missing. Chunk artifacts are left in place; removing them is the
/// caller's next step.
#[instrument(skip_all, fields(upload_id = %session.upload_id, total_parts = session.total_parts))]
pub async fn assemble(
    chunks: &ChunkStore,
    session: &UploadSession,
    store: &dyn ObjectStore,
) -> UploadResult<StoredObject> {
    let uploaded = chunks.list_uploaded_parts(&session.upload_id).await?;
    if !is_complete(&uploaded, session.total_parts) {
        return Err(UploadError::IncompleteUpload {
            uploaded,
            total_parts: session.total_parts,
        });
    }

    let stored = store
        .put_object(PutObjectRequest {
            project_id: session.project_id.clone(),
            file_name: session.file_name.clone(),
            content_type: session.content_type.clone(),
            source: ObjectSource::Parts(chunks.part_paths(&session.upload_id, session.total_parts)),
        })
        .await?;

    debug!(object_key = %stored.object_key, size = stored.size, "Parts assembled");
    Ok(stored)
}
