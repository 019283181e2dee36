//! Chunk receiver: part-indexed artifacts in a per-session directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use stowage_shared::UploadId;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

use super::error::{UploadError, UploadResult};
use super::session::UploadSession;

const PART_EXTENSION: &str = "part";

/// Session-scoped chunk storage on the local filesystem.
///
/// Each chunk is streamed into a unique temp file and renamed to
/// `{index}.part`, so a reader only ever sees complete parts and concurrent
/// writes of the same index resolve to the last rename.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    /// Create a chunk store under `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory owned by one session.
    #[must_use]
    pub fn session_dir(&self, id: &UploadId) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn part_path(&self, id: &UploadId, part_index: u32) -> PathBuf {
        self.session_dir(id)
            .join(format!("{part_index}.{PART_EXTENSION}"))
    }

    /// Store one chunk, replacing any previous content at the index.
    ///
    /// Returns the number of bytes stored. A chunk larger than the session's
    /// part size is rejected.
    pub async fn write_chunk<R>(
        &self,
        session: &UploadSession,
        part_index: u32,
        reader: R,
    ) -> UploadResult<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        if part_index >= session.total_parts {
            return Err(UploadError::validation(format!(
                "part index {part_index} out of range 0..{}",
                session.total_parts
            )));
        }

        let dir = self.session_dir(&session.upload_id);
        tokio::fs::create_dir_all(&dir).await.map_err(io_error)?;
        let temp = dir.join(format!("{part_index}.{}.tmp", Uuid::new_v4().simple()));

        match Self::stream_to(&temp, reader, session.part_size).await {
            Ok(size) if size > session.part_size => {
                let _ = tokio::fs::remove_file(&temp).await;
                Err(UploadError::validation(format!(
                    "part {part_index} exceeds part size {}",
                    session.part_size
                )))
            }
            Ok(size) => {
                let target = self.part_path(&session.upload_id, part_index);
                if let Err(e) = tokio::fs::rename(&temp, &target).await {
                    let _ = tokio::fs::remove_file(&temp).await;
                    return Err(io_error(e));
                }
                debug!(upload_id = %session.upload_id, part_index, size, "Chunk stored");
                Ok(size)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp).await;
                Err(io_error(e))
            }
        }
    }

    /// Copy at most `limit + 1` bytes into `path`.
    async fn stream_to<R>(path: &Path, reader: R, limit: u64) -> std::io::Result<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut file = tokio::fs::File::create(path).await?;
        let mut bounded = reader.take(limit.saturating_add(1));
        let size = tokio::io::copy(&mut bounded, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(size)
    }

    /// Indices of stored parts, ascending and distinct.
    pub async fn list_uploaded_parts(&self, id: &UploadId) -> UploadResult<Vec<u32>> {
        let mut entries = match tokio::fs::read_dir(self.session_dir(id)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(e)),
        };

        let mut parts = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let file_name = entry.file_name();
            let index = file_name
                .to_str()
                .and_then(|name| name.strip_suffix(".part"))
                .and_then(|stem| stem.parse::<u32>().ok());
            if let Some(index) = index {
                parts.push(index);
            }
        }
        parts.sort_unstable();
        parts.dedup();
        Ok(parts)
    }

    /// Paths of parts `0..total_parts`, in order.
    #[must_use]
    pub fn part_paths(&self, id: &UploadId, total_parts: u32) -> Vec<PathBuf> {
        (0..total_parts)
            .map(|index| self.part_path(id, index))
            .collect()
    }

    /// Remove a session's chunk directory. A missing directory is fine.
    pub async fn purge(&self, id: &UploadId) -> std::io::Result<()> {
        match tokio::fs::remove_dir_all(self.session_dir(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn io_error(err: std::io::Error) -> UploadError {
    UploadError::Storage(err.into())
}
