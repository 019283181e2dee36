//! Upload lifecycle service.
//!
//! Ties strategy selection, the session store, chunk storage, assembly and the
//! remote multipart coordinator into the operations callers use.
//!
//! Destructive operations (`complete`, `abort`) first take a per-session
//! finalize claim. Their two-step cleanups write a cleanup marker after the
//! first step so [`UploadService::recover_pending_cleanups`] can finish an
//! interrupted cleanup.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use stowage_shared::UploadId;
use tokio::io::AsyncRead;
use tracing::{info, instrument, warn};

use super::assembler::assemble;
use super::chunks::ChunkStore;
use super::config::UploadConfig;
use super::error::{UploadError, UploadResult};
use super::kv::SessionKv;
use super::multipart::MultipartCoordinator;
use super::session::{
    ChunkReceipt, CompleteUpload, CompletedUpload, DEFAULT_CONTENT_TYPE, InitiateUpload,
    NewSession, UploadSession, UploadStatus,
};
use super::store::{CleanupMarker, CleanupStage, FinalizeOp, SessionStore};
use super::strategy::{UploadOperation, UploadStrategy, select_strategy};
use crate::storage::{
    PresignedUrl, StorageError, StorageHandle, StorageResolver, StoredObject, is_safe_segment,
    object_key, sanitize_file_name,
};

/// Resumable upload service.
pub struct UploadService {
    config: UploadConfig,
    resolver: Arc<dyn StorageResolver>,
    sessions: SessionStore,
    chunks: ChunkStore,
}

impl UploadService {
    /// Create a service; chunk artifacts live under the configured work dir.
    #[must_use]
    pub fn new(
        config: UploadConfig,
        resolver: Arc<dyn StorageResolver>,
        kv: Arc<dyn SessionKv>,
    ) -> Self {
        let chunks = ChunkStore::new(config.chunks_dir());
        Self {
            config,
            resolver,
            sessions: SessionStore::new(kv),
            chunks,
        }
    }

    /// Service configuration.
    #[must_use]
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Underlying session store.
    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Underlying chunk store.
    #[must_use]
    pub fn chunks(&self) -> &ChunkStore {
        &self.chunks
    }

    fn coordinator<'a>(&self, handle: &'a StorageHandle) -> UploadResult<MultipartCoordinator<'a>> {
        let backend = handle.multipart()?;
        Ok(MultipartCoordinator::new(&**backend, self.config.presign_ttl()))
    }

    /// Resolve the storage a session was created against.
    async fn handle_for(&self, session: &UploadSession) -> UploadResult<StorageHandle> {
        let handle = self
            .resolver
            .resolve(session.storage_config_id.as_deref())
            .await?;
        if handle.kind != session.provider_name {
            return Err(StorageError::configuration(format!(
                "storage config now targets {} but the session was created for {}",
                handle.kind, session.provider_name
            ))
            .into());
        }
        Ok(handle)
    }

    fn ensure_allowed(session: &UploadSession, operation: UploadOperation) -> UploadResult<()> {
        if operation.allowed_for(session.strategy) {
            Ok(())
        } else {
            Err(UploadError::StrategyMismatch {
                strategy: session.strategy,
                operation,
            })
        }
    }

    /// Start an upload.
    ///
    /// Validates the request, picks the strategy for the target backend,
    /// starts the backend multipart upload for `S3_MULTIPART`, and persists
    /// the session.
    #[instrument(skip(self, input), fields(project_id = %input.project_id, file_size = input.file_size))]
    pub async fn initiate(&self, input: InitiateUpload) -> UploadResult<UploadSession> {
        if !is_safe_segment(&input.project_id) {
            return Err(UploadError::validation(format!(
                "invalid project id: {}",
                input.project_id
            )));
        }
        let file_name = sanitize_file_name(&input.file_name);
        if file_name.is_empty() {
            return Err(UploadError::validation("file name is empty after sanitizing"));
        }
        if input.file_size == 0 {
            return Err(UploadError::validation("file size must be greater than zero"));
        }
        if input.file_size > self.config.max_file_size {
            return Err(UploadError::validation(format!(
                "file size {} exceeds limit {}",
                input.file_size, self.config.max_file_size
            )));
        }
        let content_type = input
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let handle = self
            .resolver
            .resolve(input.storage_config_id.as_deref())
            .await?;
        let strategy = select_strategy(handle.kind, input.prefer_single);
        let key = object_key(&input.project_id, &file_name);

        let remote_multipart_id = if strategy == UploadStrategy::S3Multipart {
            Some(self.coordinator(&handle)?.begin(&key, &content_type).await?)
        } else {
            None
        };

        let created = self
            .sessions
            .create(NewSession {
                strategy,
                project_id: input.project_id,
                file_name,
                content_type,
                file_size: input.file_size,
                provider_name: handle.kind,
                storage_config_id: input.storage_config_id,
                object_key: key.clone(),
                remote_multipart_id: remote_multipart_id.clone(),
            })
            .await;

        match created {
            Ok(session) => {
                info!(
                    upload_id = %session.upload_id,
                    strategy = %session.strategy,
                    total_parts = session.total_parts,
                    "Upload initiated"
                );
                Ok(session)
            }
            Err(err) => {
                if let (Some(multipart_id), Ok(backend)) =
                    (remote_multipart_id, handle.multipart())
                    && let Err(abort_err) = backend.abort_multipart(&key, &multipart_id).await
                {
                    warn!(
                        object_key = %key,
                        error = %abort_err,
                        "Failed to abort multipart upload after session persistence failed"
                    );
                }
                Err(err)
            }
        }
    }

    /// Store one chunk of a server-mediated upload.
    #[instrument(skip(self, reader), fields(upload_id = %id))]
    pub async fn upload_chunk<R>(
        &self,
        id: &UploadId,
        part_index: u32,
        reader: R,
    ) -> UploadResult<ChunkReceipt>
    where
        R: AsyncRead + Unpin + Send,
    {
        let session = self.sessions.load(id).await?;
        Self::ensure_allowed(&session, UploadOperation::UploadChunk)?;

        let size = self.chunks.write_chunk(&session, part_index, reader).await?;
        Ok(ChunkReceipt {
            upload_id: *id,
            part_index,
            size,
        })
    }

    /// Presigned URL for one part of an `S3_MULTIPART` upload.
    #[instrument(skip(self), fields(upload_id = %id))]
    pub async fn presign_part(&self, id: &UploadId, part_number: u32) -> UploadResult<PresignedUrl> {
        let session = self.sessions.load(id).await?;
        Self::ensure_allowed(&session, UploadOperation::PresignPart)?;

        let handle = self.handle_for(&session).await?;
        self.coordinator(&handle)?
            .presign_part(&session, part_number)
            .await
    }

    /// Presigned whole-object PUT URL for an `S3_SINGLE` upload.
    #[instrument(skip(self), fields(upload_id = %id))]
    pub async fn presign_single(&self, id: &UploadId) -> UploadResult<PresignedUrl> {
        let session = self.sessions.load(id).await?;
        Self::ensure_allowed(&session, UploadOperation::PresignSingle)?;

        let handle = self.handle_for(&session).await?;
        self.coordinator(&handle)?.presign_single(&session).await
    }

    /// Session metadata and the parts received so far.
    ///
    /// For backend-mediated uploads the backend is asked, not local state.
    #[instrument(skip(self), fields(upload_id = %id))]
    pub async fn status(&self, id: &UploadId) -> UploadResult<UploadStatus> {
        let session = self.sessions.load(id).await?;

        let (uploaded_parts, remote_parts) = match session.strategy {
            UploadStrategy::LocalChunk | UploadStrategy::ServerChunkToRemote => {
                (self.chunks.list_uploaded_parts(id).await?, Vec::new())
            }
            UploadStrategy::S3Multipart => {
                let handle = self.handle_for(&session).await?;
                let remote = self.coordinator(&handle)?.remote_parts(&session).await?;
                (remote.iter().map(|part| part.part_number).collect(), remote)
            }
            UploadStrategy::S3Single => {
                let handle = self.handle_for(&session).await?;
                let uploaded = self.coordinator(&handle)?.single_uploaded(&session).await?;
                (if uploaded { vec![1] } else { Vec::new() }, Vec::new())
            }
        };

        Ok(UploadStatus {
            session,
            uploaded_parts,
            remote_parts,
        })
    }

    /// Finalize an upload and remove its session.
    ///
    /// On failure the claim is released and the session stays usable, so the
    /// client can resend parts or retry.
    #[instrument(skip(self, input), fields(upload_id = %id))]
    pub async fn complete(
        &self,
        id: &UploadId,
        input: CompleteUpload,
    ) -> UploadResult<CompletedUpload> {
        if self.sessions.claim(id, FinalizeOp::Complete).await?.is_some() {
            return Err(UploadError::Finalizing(*id));
        }

        let finalized = match self.sessions.load(id).await {
            Ok(session) => self
                .finalize(&session, input)
                .await
                .map(|stored| (session, stored)),
            Err(err) => Err(err),
        };
        let (session, stored) = match finalized {
            Ok(done) => done,
            Err(err) => {
                if let Err(release_err) = self.sessions.release_claim(id).await {
                    warn!(error = %release_err, "Failed to release finalize claim");
                }
                return Err(err);
            }
        };

        self.settle(&session, CleanupStage::ObjectCommitted).await;
        info!(
            object_key = %stored.object_key,
            size = stored.size,
            strategy = %session.strategy,
            "Upload completed"
        );

        Ok(CompletedUpload {
            url: stored.url,
            content_hash: stored.content_hash,
            object_key: stored.object_key,
            file_name: session.file_name,
            size: stored.size,
        })
    }

    async fn finalize(
        &self,
        session: &UploadSession,
        input: CompleteUpload,
    ) -> UploadResult<StoredObject> {
        let handle = self.handle_for(session).await?;
        match session.strategy {
            UploadStrategy::LocalChunk | UploadStrategy::ServerChunkToRemote => {
                assemble(&self.chunks, session, handle.store.as_ref()).await
            }
            UploadStrategy::S3Multipart => {
                let parts = input.parts.ok_or_else(|| {
                    UploadError::validation("parts are required to complete a multipart upload")
                })?;
                self.coordinator(&handle)?.complete(session, parts).await
            }
            UploadStrategy::S3Single => {
                self.coordinator(&handle)?
                    .complete_single(session, input.etag.as_deref())
                    .await
            }
        }
    }

    /// Abort an upload. Unknown ids and repeated aborts succeed.
    #[instrument(skip(self), fields(upload_id = %id))]
    pub async fn abort(&self, id: &UploadId) -> UploadResult<()> {
        match self.sessions.claim(id, FinalizeOp::Abort).await? {
            None => {}
            Some(FinalizeOp::Abort) => return Ok(()),
            Some(FinalizeOp::Complete) => return Err(UploadError::Finalizing(*id)),
        }

        let session = match self.sessions.load(id).await {
            Ok(session) => session,
            Err(UploadError::SessionNotFound(_)) => {
                if let Err(e) = self.chunks.purge(id).await {
                    warn!(error = %e, "Failed to purge chunks of unknown session");
                }
                self.sessions.release_claim(id).await?;
                return Ok(());
            }
            Err(err) => {
                self.sessions.release_claim(id).await?;
                return Err(err);
            }
        };

        self.abort_session(&session).await;
        info!(strategy = %session.strategy, "Upload aborted");
        Ok(())
    }

    /// Abort the remote upload if any, then remove local state. Never fails;
    /// leftovers are recorded for the recovery sweep.
    async fn abort_session(&self, session: &UploadSession) {
        let mut stage = CleanupStage::Aborted;
        if session.strategy == UploadStrategy::S3Multipart {
            let aborted = match self.handle_for(session).await {
                Ok(handle) => match self.coordinator(&handle) {
                    Ok(coordinator) => coordinator.abort(session).await.map_err(UploadError::from),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            if let Err(e) = aborted {
                warn!(
                    upload_id = %session.upload_id,
                    error = %e,
                    "Remote multipart abort failed; left for recovery sweep"
                );
                stage = CleanupStage::RemoteAbortPending;
            }
        }
        self.settle(session, stage).await;
    }

    /// Record a cleanup marker, then remove chunk artifacts, the session
    /// record and the claim.
    async fn settle(&self, session: &UploadSession, stage: CleanupStage) {
        let id = &session.upload_id;
        let marker = CleanupMarker::for_session(session, stage);
        if let Err(e) = self.sessions.record_cleanup(&marker).await {
            warn!(upload_id = %id, error = %e, "Failed to record cleanup marker");
        }

        if let Err(e) = self.purge_local(id).await {
            warn!(upload_id = %id, error = %e, "Cleanup failed; left for recovery sweep");
            return;
        }
        if stage != CleanupStage::RemoteAbortPending
            && let Err(e) = self.sessions.clear_cleanup(id).await
        {
            warn!(upload_id = %id, error = %e, "Failed to clear cleanup marker");
        }
    }

    async fn purge_local(&self, id: &UploadId) -> UploadResult<()> {
        self.chunks
            .purge(id)
            .await
            .map_err(|e| UploadError::Storage(e.into()))?;
        self.sessions.remove(id).await?;
        self.sessions.release_claim(id).await?;
        Ok(())
    }

    /// Finish cleanups interrupted after their first step, then release
    /// finalize claims older than the claim lease. Returns how many markers
    /// and claims were cleared.
    #[instrument(skip(self))]
    pub async fn recover_pending_cleanups(&self) -> UploadResult<usize> {
        let mut recovered = 0;
        for marker in self.sessions.pending_cleanups().await? {
            let id = marker.upload_id;
            if marker.stage == CleanupStage::RemoteAbortPending
                && let Err(e) = self.retry_remote_abort(&marker).await
            {
                warn!(upload_id = %id, error = %e, "Remote abort retry failed");
                continue;
            }
            if let Err(e) = self.purge_local(&id).await {
                warn!(upload_id = %id, error = %e, "Local cleanup retry failed");
                continue;
            }
            self.sessions.clear_cleanup(&id).await?;
            recovered += 1;
        }

        let lease = TimeDelta::from_std(self.config.claim_lease()).unwrap_or(TimeDelta::MAX);
        let cutoff = Utc::now().checked_sub_signed(lease).unwrap_or(DateTime::<Utc>::MIN_UTC);
        for id in self.sessions.release_stale_claims(cutoff).await? {
            warn!(upload_id = %id, "Released stale finalize claim");
            recovered += 1;
        }

        if recovered > 0 {
            info!(recovered, "Recovered pending cleanups");
        }
        Ok(recovered)
    }

    async fn retry_remote_abort(&self, marker: &CleanupMarker) -> UploadResult<()> {
        let Some(multipart_id) = marker.remote_multipart_id.as_deref() else {
            return Ok(());
        };
        let handle = self
            .resolver
            .resolve(marker.storage_config_id.as_deref())
            .await?;
        match handle
            .multipart()?
            .abort_multipart(&marker.object_key, multipart_id)
            .await
        {
            Ok(()) | Err(StorageError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Abort every session older than `max_age`, whatever claim it holds.
    /// Returns how many sessions were swept.
    #[instrument(skip(self))]
    pub async fn sweep_stale(&self, max_age: Duration) -> UploadResult<usize> {
        let now = Utc::now();
        let mut swept = 0;
        for session in self.sessions.list_sessions().await? {
            if !session.is_older_than(max_age, now) {
                continue;
            }
            self.sessions
                .force_claim(&session.upload_id, FinalizeOp::Abort)
                .await?;
            self.abort_session(&session).await;
            swept += 1;
        }

        if swept > 0 {
            info!(swept, "Swept stale upload sessions");
        }
        Ok(swept)
    }
}
