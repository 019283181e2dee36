//! Storage service implementation using Apache OpenDAL.

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use opendal::{Buffer, ErrorKind, Operator, Writer, services};
use sha2::{Digest, Sha256};
use stowage_shared::BackendKind;
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::config::{S3Settings, StorageProvider};
use super::error::StorageError;
use super::key::{is_safe_segment, object_key, sanitize_file_name};
use super::types::{ObjectSource, PutObjectRequest, StoredObject};
use super::url::{local_object_url, webdav_object_url};

/// Read buffer size when streaming part files into a backend.
const STREAM_CHUNK_SIZE: usize = 1024 * 1024;

/// Uniform put/delete contract over one physical backend.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend kind.
    fn kind(&self) -> BackendKind;

    /// Store an object under `{project_id}/{sanitized file_name}`.
    async fn put_object(&self, req: PutObjectRequest) -> Result<StoredObject, StorageError>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete_object(&self, project_id: &str, object_key: &str) -> Result<(), StorageError>;
}

/// Storage service backed by an OpenDAL operator.
pub struct StorageService {
    operator: Operator,
    provider: StorageProvider,
}

impl StorageService {
    /// Create a new storage service from a provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage provider cannot be initialized.
    pub fn from_provider(provider: StorageProvider) -> Result<Self, StorageError> {
        let operator = Self::create_operator(&provider)?;
        Ok(Self { operator, provider })
    }

    /// Create OpenDAL operator from provider config.
    fn create_operator(provider: &StorageProvider) -> Result<Operator, StorageError> {
        let configured = |err: opendal::Error| StorageError::configuration(err.to_string());

        match provider {
            StorageProvider::Local { root, .. } => {
                let builder = services::Fs::default().root(
                    root.to_str()
                        .ok_or_else(|| StorageError::configuration("invalid path"))?,
                );
                Ok(Operator::new(builder).map_err(configured)?.finish())
            }
            StorageProvider::Webdav {
                endpoint,
                root,
                username,
                password,
                ..
            } => {
                let mut builder = services::Webdav::default().endpoint(endpoint).root(root);
                if let Some(username) = username {
                    builder = builder.username(username);
                }
                if let Some(password) = password {
                    builder = builder.password(password);
                }
                Ok(Operator::new(builder).map_err(configured)?.finish())
            }
            StorageProvider::S3(settings) => {
                let mut builder = services::S3::default()
                    .bucket(&settings.bucket)
                    .region(&settings.region);
                if let Some(endpoint) = settings.endpoint_url() {
                    builder = builder.endpoint(&endpoint);
                }
                if let (Some(key_id), Some(secret)) =
                    (&settings.access_key_id, &settings.secret_access_key)
                {
                    builder = builder.access_key_id(key_id).secret_access_key(secret);
                }
                if !settings.force_path_style {
                    builder = builder.enable_virtual_host_style();
                }
                Ok(Operator::new(builder).map_err(configured)?.finish())
            }
            StorageProvider::Oss(settings) => {
                let endpoint = settings.endpoint_url().ok_or_else(|| {
                    StorageError::configuration("OSS provider requires an endpoint")
                })?;
                let mut builder = services::Oss::default()
                    .bucket(&settings.bucket)
                    .endpoint(&endpoint);
                if let (Some(key_id), Some(secret)) =
                    (&settings.access_key_id, &settings.secret_access_key)
                {
                    builder = builder.access_key_id(key_id).access_key_secret(secret);
                }
                Ok(Operator::new(builder).map_err(configured)?.finish())
            }
        }
    }

    /// Public URL for an object key.
    #[must_use]
    pub fn public_url(&self, key: &str) -> String {
        match &self.provider {
            StorageProvider::Local {
                public_base_url, ..
            } => local_object_url(public_base_url.as_deref(), key),
            StorageProvider::Webdav {
                endpoint,
                root,
                public_base_url,
                ..
            } => webdav_object_url(public_base_url.as_deref(), endpoint, root, key),
            StorageProvider::S3(settings) | StorageProvider::Oss(settings) => {
                S3Settings::object_url(settings, key)
            }
        }
    }

    /// Feed a source into an open writer, returning hex SHA-256 and size.
    ///
    /// Backends that accept a single write per object (WebDAV) get the whole
    /// body in one write; the others are streamed chunk by chunk.
    async fn copy_source(
        writer: &mut Writer,
        source: ObjectSource,
        multi_write: bool,
    ) -> Result<(String, u64), StorageError> {
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        let mut held: Vec<Bytes> = Vec::new();

        match source {
            ObjectSource::Bytes(bytes) => {
                hasher.update(&bytes);
                size = bytes.len() as u64;
                held.push(bytes);
            }
            ObjectSource::Parts(paths) => {
                for path in paths {
                    let file = tokio::fs::File::open(&path).await?;
                    let mut stream = ReaderStream::with_capacity(file, STREAM_CHUNK_SIZE);
                    while let Some(chunk) = stream.try_next().await? {
                        hasher.update(&chunk);
                        size += chunk.len() as u64;
                        if multi_write {
                            writer.write(chunk).await?;
                        } else {
                            held.push(chunk);
                        }
                    }
                }
            }
        }

        if !held.is_empty() {
            writer.write(Buffer::from(held)).await?;
        }
        Ok((hex::encode(hasher.finalize()), size))
    }
}

#[async_trait]
impl ObjectStore for StorageService {
    fn kind(&self) -> BackendKind {
        self.provider.kind()
    }

    async fn put_object(&self, req: PutObjectRequest) -> Result<StoredObject, StorageError> {
        if !is_safe_segment(&req.project_id) {
            return Err(StorageError::InvalidKey(req.project_id));
        }
        let file_name = sanitize_file_name(&req.file_name);
        if file_name.is_empty() {
            return Err(StorageError::InvalidKey(req.file_name));
        }
        let key = object_key(&req.project_id, &file_name);

        let capability = self.operator.info().full_capability();
        let mut pending = self.operator.writer_with(&key);
        if capability.write_with_content_type {
            pending = pending.content_type(&req.content_type);
        }
        let mut writer = pending.await?;

        let copied = Self::copy_source(&mut writer, req.source, capability.write_can_multi).await;
        let (content_hash, size) = match copied {
            Ok(written) => written,
            Err(err) => {
                if let Err(abort_err) = writer.abort().await {
                    debug!(key = %key, error = %abort_err, "Failed to abort partial write");
                }
                return Err(err);
            }
        };
        writer.close().await?;

        debug!(key = %key, size, backend = %self.kind(), "Object stored");

        Ok(StoredObject {
            url: self.public_url(&key),
            content_hash,
            object_key: key,
            size,
        })
    }

    async fn delete_object(&self, project_id: &str, object_key: &str) -> Result<(), StorageError> {
        let prefix = format!("{project_id}/");
        if !is_safe_segment(project_id) || !object_key.starts_with(&prefix) {
            return Err(StorageError::InvalidKey(object_key.to_string()));
        }

        match self.operator.delete(object_key).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
