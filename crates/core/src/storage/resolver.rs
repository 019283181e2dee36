//! Storage configuration resolution.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use stowage_shared::BackendKind;
use tracing::info;

use super::config::StorageProfiles;
use super::error::StorageError;
use super::s3::{MultipartBackend, S3MultipartBackend};
use super::service::{ObjectStore, StorageService};

/// Ready-to-use storage capabilities for one storage config.
#[derive(Clone)]
pub struct StorageHandle {
    /// Profile the handle was built from.
    pub profile_id: String,
    /// Backend kind.
    pub kind: BackendKind,
    /// Whole-object put/delete.
    pub store: Arc<dyn ObjectStore>,
    /// Native multipart and presigning; present for S3-family backends only.
    pub multipart: Option<Arc<dyn MultipartBackend>>,
}

impl StorageHandle {
    /// Create a handle from an object store and optional multipart backend.
    #[must_use]
    pub fn new(
        profile_id: impl Into<String>,
        store: Arc<dyn ObjectStore>,
        multipart: Option<Arc<dyn MultipartBackend>>,
    ) -> Self {
        Self {
            profile_id: profile_id.into(),
            kind: store.kind(),
            store,
            multipart,
        }
    }

    /// Multipart backend, or `MultipartNotSupported`.
    pub fn multipart(&self) -> Result<&Arc<dyn MultipartBackend>, StorageError> {
        self.multipart
            .as_ref()
            .ok_or(StorageError::MultipartNotSupported { backend: self.kind })
    }
}

impl std::fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHandle")
            .field("profile_id", &self.profile_id)
            .field("kind", &self.kind)
            .field("multipart", &self.multipart.is_some())
            .finish_non_exhaustive()
    }
}

/// Resolves an opaque storage config ID into storage capabilities.
#[async_trait]
pub trait StorageResolver: Send + Sync {
    /// Resolve a storage config ID; `None` selects the default.
    async fn resolve(&self, storage_config_id: Option<&str>) -> Result<StorageHandle, StorageError>;
}

/// Resolver over named profiles from configuration, caching built handles.
pub struct ProfileResolver {
    profiles: StorageProfiles,
    cache: DashMap<String, StorageHandle>,
}

impl ProfileResolver {
    /// Create a resolver over the given profiles.
    #[must_use]
    pub fn new(profiles: StorageProfiles) -> Self {
        Self {
            profiles,
            cache: DashMap::new(),
        }
    }
}

#[async_trait]
impl StorageResolver for ProfileResolver {
    async fn resolve(&self, storage_config_id: Option<&str>) -> Result<StorageHandle, StorageError> {
        let (profile_id, provider) = self.profiles.resolve(storage_config_id)?;
        if let Some(handle) = self.cache.get(profile_id).map(|entry| entry.clone()) {
            return Ok(handle);
        }

        let kind = provider.kind();
        let store: Arc<dyn ObjectStore> = Arc::new(StorageService::from_provider(provider.clone())?);
        let multipart: Option<Arc<dyn MultipartBackend>> = match provider.s3_settings() {
            Some(settings) => Some(Arc::new(
                S3MultipartBackend::new(settings.clone(), kind).await?,
            )),
            None => None,
        };
        info!(profile = %profile_id, backend = %kind, "Storage profile initialized");

        let handle = StorageHandle::new(profile_id, store, multipart);
        Ok(self
            .cache
            .entry(profile_id.to_string())
            .or_insert(handle)
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::config::{S3Settings, StorageProvider};

    fn profiles(root: &std::path::Path) -> StorageProfiles {
        StorageProfiles::single("local", StorageProvider::local_fs(root)).with_profile(
            "minio",
            StorageProvider::S3(
                S3Settings::new("artifacts", "us-east-1")
                    .with_credentials("minioadmin", "minioadmin")
                    .with_endpoint("http://localhost:9000")
                    .with_path_style(true),
            ),
        )
    }

    #[tokio::test]
    async fn test_resolve_default_local() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = ProfileResolver::new(profiles(dir.path()));

        let handle = resolver.resolve(None).await.expect("default profile");
        assert_eq!(handle.profile_id, "local");
        assert_eq!(handle.kind, BackendKind::Local);
        assert!(handle.multipart.is_none());
        assert!(matches!(
            handle.multipart(),
            Err(StorageError::MultipartNotSupported {
                backend: BackendKind::Local
            })
        ));
    }

    #[tokio::test]
    async fn test_resolve_s3_has_multipart() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = ProfileResolver::new(profiles(dir.path()));

        let handle = resolver.resolve(Some("minio")).await.expect("s3 profile");
        assert_eq!(handle.kind, BackendKind::S3);
        assert!(handle.multipart().is_ok());
    }

    #[tokio::test]
    async fn test_resolve_caches_handles() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = ProfileResolver::new(profiles(dir.path()));

        let first = resolver.resolve(Some("local")).await.expect("profile");
        let second = resolver.resolve(None).await.expect("profile");
        assert!(Arc::ptr_eq(&first.store, &second.store));
    }

    #[tokio::test]
    async fn test_resolve_unknown_profile() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = ProfileResolver::new(profiles(dir.path()));

        let err = resolver.resolve(Some("nope")).await.unwrap_err();
        assert!(matches!(err, StorageError::UnknownProfile(_)));
    }
}
