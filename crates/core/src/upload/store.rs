//! Session store: write-once session records, finalize claims and cleanup
//! markers on top of a [`SessionKv`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stowage_shared::UploadId;
use tracing::warn;

use super::error::{UploadError, UploadResult};
use super::kv::{KvError, SessionKv};
use super::policy::plan_parts;
use super::session::{NewSession, UploadSession};

const SESSIONS: &str = "sessions";
const CLAIMS: &str = "claims";
const CLEANUP: &str = "cleanup";

/// Destructive operation holding a session's finalize claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalizeOp {
    /// Completion in progress.
    Complete,
    /// Abort in progress.
    Abort,
}

#[derive(Debug, Serialize, Deserialize)]
struct ClaimRecord {
    upload_id: UploadId,
    operation: FinalizeOp,
    claimed_at: DateTime<Utc>,
}

/// How far an interrupted two-step cleanup got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CleanupStage {
    /// The object is stored; local artifacts and metadata remain.
    ObjectCommitted,
    /// The upload was aborted; local artifacts and metadata remain.
    Aborted,
    /// The remote multipart abort failed and must be retried.
    RemoteAbortPending,
}

/// Write-ahead record of a pending cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupMarker {
    /// Session being cleaned up.
    pub upload_id: UploadId,
    /// Stage reached.
    pub stage: CleanupStage,
    /// Backend object key.
    pub object_key: String,
    /// Storage config of the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_config_id: Option<String>,
    /// Backend multipart id, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_multipart_id: Option<String>,
    /// When the marker was written.
    pub recorded_at: DateTime<Utc>,
}

impl CleanupMarker {
    /// Marker for a session at a given stage.
    #[must_use]
    pub fn for_session(session: &UploadSession, stage: CleanupStage) -> Self {
        Self {
            upload_id: session.upload_id,
            stage,
            object_key: session.object_key.clone(),
            storage_config_id: session.storage_config_id.clone(),
            remote_multipart_id: session.remote_multipart_id.clone(),
            recorded_at: Utc::now(),
        }
    }
}

fn key(namespace: &str, id: &UploadId) -> String {
    format!("{namespace}/{id}")
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, KvError> {
    serde_json::to_vec(value).map_err(|e| KvError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, KvError> {
    serde_json::from_slice(bytes).map_err(|e| KvError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Durable session records.
///
/// Records are never mutated after creation, so concurrent readers need no
/// lock.
#[derive(Clone)]
pub struct SessionStore {
    kv: Arc<dyn SessionKv>,
}

impl SessionStore {
    /// Create a store over a key-value backend.
    #[must_use]
    pub fn new(kv: Arc<dyn SessionKv>) -> Self {
        Self { kv }
    }

    /// Assign an id, part plan and timestamp, then persist the record.
    pub async fn create(&self, new: NewSession) -> UploadResult<UploadSession> {
        let plan = plan_parts(new.file_size);
        let session = UploadSession {
            upload_id: UploadId::new(),
            strategy: new.strategy,
            project_id: new.project_id,
            file_name: new.file_name,
            content_type: new.content_type,
            file_size: new.file_size,
            part_size: plan.part_size,
            total_parts: plan.total_parts,
            provider_name: new.provider_name,
            storage_config_id: new.storage_config_id,
            object_key: new.object_key,
            remote_multipart_id: new.remote_multipart_id,
            created_at: Utc::now(),
        };

        let key = key(SESSIONS, &session.upload_id);
        if !self.kv.put_if_absent(&key, encode(&key, &session)?).await? {
            return Err(UploadError::Store(KvError::AlreadyExists(key)));
        }
        Ok(session)
    }

    /// Persist a fully built record. Fails if the id is taken.
    #[cfg(test)]
    pub(crate) async fn insert(&self, session: &UploadSession) -> UploadResult<()> {
        let key = key(SESSIONS, &session.upload_id);
        if !self.kv.put_if_absent(&key, encode(&key, session)?).await? {
            return Err(UploadError::Store(KvError::AlreadyExists(key)));
        }
        Ok(())
    }

    /// Load a session.
    pub async fn load(&self, id: &UploadId) -> UploadResult<UploadSession> {
        let key = key(SESSIONS, id);
        match self.kv.get(&key).await? {
            Some(bytes) => Ok(decode(&key, &bytes)?),
            None => Err(UploadError::SessionNotFound(*id)),
        }
    }

    /// Remove a session record. Removing an unknown id succeeds.
    pub async fn remove(&self, id: &UploadId) -> UploadResult<()> {
        self.kv.delete(&key(SESSIONS, id)).await?;
        Ok(())
    }

    /// All readable session records; corrupt ones are logged and skipped.
    pub async fn list_sessions(&self) -> UploadResult<Vec<UploadSession>> {
        let mut sessions = Vec::new();
        for key in self.kv.list(SESSIONS).await? {
            let Some(bytes) = self.kv.get(&key).await? else {
                continue;
            };
            match decode::<UploadSession>(&key, &bytes) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable session record"),
            }
        }
        Ok(sessions)
    }

    /// Try to take the finalize claim. Returns the current holder when the
    /// claim is already taken.
    pub async fn claim(&self, id: &UploadId, operation: FinalizeOp) -> UploadResult<Option<FinalizeOp>> {
        let key = key(CLAIMS, id);
        let record = ClaimRecord {
            upload_id: *id,
            operation,
            claimed_at: Utc::now(),
        };
        if self.kv.put_if_absent(&key, encode(&key, &record)?).await? {
            return Ok(None);
        }

        match self.kv.get(&key).await? {
            Some(bytes) => Ok(Some(decode::<ClaimRecord>(&key, &bytes)?.operation)),
            // Released between the two calls: treat as held by the other op.
            None => Ok(Some(operation)),
        }
    }

    /// Take the finalize claim unconditionally.
    pub async fn force_claim(&self, id: &UploadId, operation: FinalizeOp) -> UploadResult<()> {
        let key = key(CLAIMS, id);
        let record = ClaimRecord {
            upload_id: *id,
            operation,
            claimed_at: Utc::now(),
        };
        self.kv.put(&key, encode(&key, &record)?).await?;
        Ok(())
    }

    /// Write a claim with an arbitrary timestamp.
    #[cfg(test)]
    pub(crate) async fn backdate_claim(
        &self,
        id: &UploadId,
        operation: FinalizeOp,
        claimed_at: DateTime<Utc>,
    ) -> UploadResult<()> {
        let key = key(CLAIMS, id);
        let record = ClaimRecord {
            upload_id: *id,
            operation,
            claimed_at,
        };
        self.kv.put(&key, encode(&key, &record)?).await?;
        Ok(())
    }

    /// Release the finalize claim.
    pub async fn release_claim(&self, id: &UploadId) -> UploadResult<()> {
        self.kv.delete(&key(CLAIMS, id)).await?;
        Ok(())
    }

    /// Release claims taken before `cutoff`. A claim that old belongs to an
    /// operation that died without releasing it. Returns the released ids.
    pub async fn release_stale_claims(&self, cutoff: DateTime<Utc>) -> UploadResult<Vec<UploadId>> {
        let mut released = Vec::new();
        for key in self.kv.list(CLAIMS).await? {
            let Some(bytes) = self.kv.get(&key).await? else {
                continue;
            };
            match decode::<ClaimRecord>(&key, &bytes) {
                Ok(record) if record.claimed_at < cutoff => {
                    self.kv.delete(&key).await?;
                    released.push(record.upload_id);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(key = %key, error = %e, "Dropping unreadable claim record");
                    self.kv.delete(&key).await?;
                }
            }
        }
        Ok(released)
    }

    /// Record a pending cleanup.
    pub async fn record_cleanup(&self, marker: &CleanupMarker) -> UploadResult<()> {
        let key = key(CLEANUP, &marker.upload_id);
        self.kv.put(&key, encode(&key, marker)?).await?;
        Ok(())
    }

    /// Clear a cleanup marker.
    pub async fn clear_cleanup(&self, id: &UploadId) -> UploadResult<()> {
        self.kv.delete(&key(CLEANUP, id)).await?;
        Ok(())
    }

    /// All pending cleanup markers.
    pub async fn pending_cleanups(&self) -> UploadResult<Vec<CleanupMarker>> {
        let mut markers = Vec::new();
        for key in self.kv.list(CLEANUP).await? {
            if let Some(bytes) = self.kv.get(&key).await? {
                markers.push(decode(&key, &bytes)?);
            }
        }
        Ok(markers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::kv::MemoryKv;
    use crate::upload::strategy::UploadStrategy;
    use stowage_shared::BackendKind;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryKv::new()))
    }

    fn new_session(file_size: u64) -> NewSession {
        NewSession {
            strategy: UploadStrategy::LocalChunk,
            project_id: "proj".to_string(),
            file_name: "f.zip".to_string(),
            content_type: "application/zip".to_string(),
            file_size,
            provider_name: BackendKind::Local,
            storage_config_id: None,
            object_key: "proj/f.zip".to_string(),
            remote_multipart_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_computes_plan_and_persists() {
        let store = store();
        let session = store
            .create(new_session(20 * 1024 * 1024))
            .await
            .expect("create");

        assert_eq!(session.part_size, 8 * 1024 * 1024);
        assert_eq!(session.total_parts, 3);

        let loaded = store.load(&session.upload_id).await.expect("load");
        assert_eq!(loaded, session);
    }

    #[tokio::test]
    async fn test_load_unknown_is_not_found() {
        let id = UploadId::new();
        let err = store().load(&id).await.unwrap_err();
        assert!(matches!(err, UploadError::SessionNotFound(found) if found == id));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let store = store();
        let session = store.create(new_session(10)).await.expect("create");

        store.remove(&session.upload_id).await.expect("remove");
        store.remove(&session.upload_id).await.expect("remove twice");
        store.remove(&UploadId::new()).await.expect("remove unknown");
        assert!(store.load(&session.upload_id).await.is_err());
    }

    #[tokio::test]
    async fn test_release_stale_claims() {
        let kv = Arc::new(MemoryKv::new());
        let store = SessionStore::new(kv.clone());
        let fresh = UploadId::new();
        let stale = UploadId::new();
        store.claim(&fresh, FinalizeOp::Complete).await.expect("claim");
        store
            .backdate_claim(&stale, FinalizeOp::Abort, Utc::now() - chrono::TimeDelta::hours(2))
            .await
            .expect("backdate");
        kv.put("claims/garbage", b"not json".to_vec())
            .await
            .expect("put");

        let cutoff = Utc::now() - chrono::TimeDelta::hours(1);
        let released = store.release_stale_claims(cutoff).await.expect("release");
        assert_eq!(released, vec![stale]);

        assert_eq!(store.claim(&stale, FinalizeOp::Complete).await.expect("claim"), None);
        assert_eq!(
            store.claim(&fresh, FinalizeOp::Abort).await.expect("claim"),
            Some(FinalizeOp::Complete)
        );
        assert!(kv.get("claims/garbage").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let store = store();
        let id = UploadId::new();

        assert_eq!(store.claim(&id, FinalizeOp::Complete).await.expect("claim"), None);
        assert_eq!(
            store.claim(&id, FinalizeOp::Abort).await.expect("claim"),
            Some(FinalizeOp::Complete)
        );

        store.release_claim(&id).await.expect("release");
        assert_eq!(store.claim(&id, FinalizeOp::Abort).await.expect("claim"), None);
    }

    #[tokio::test]
    async fn test_force_claim_overrides() {
        let store = store();
        let id = UploadId::new();
        store.claim(&id, FinalizeOp::Complete).await.expect("claim");
        store.force_claim(&id, FinalizeOp::Abort).await.expect("force");
        assert_eq!(
            store.claim(&id, FinalizeOp::Complete).await.expect("claim"),
            Some(FinalizeOp::Abort)
        );
    }

    #[tokio::test]
    async fn test_cleanup_markers_round_trip() {
        let store = store();
        let session = store.create(new_session(10)).await.expect("create");
        let marker = CleanupMarker::for_session(&session, CleanupStage::ObjectCommitted);

        store.record_cleanup(&marker).await.expect("record");
        assert_eq!(store.pending_cleanups().await.expect("list"), vec![marker]);

        store.clear_cleanup(&session.upload_id).await.expect("clear");
        assert!(store.pending_cleanups().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_list_sessions_skips_corrupt() {
        let kv = Arc::new(MemoryKv::new());
        let store = SessionStore::new(kv.clone());
        let session = store.create(new_session(10)).await.expect("create");
        kv.put("sessions/garbage", b"not json".to_vec())
            .await
            .expect("put");

        let sessions = store.list_sessions().await.expect("list");
        assert_eq!(sessions, vec![session]);
    }
}
