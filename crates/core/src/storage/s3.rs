//! Native multipart uploads and presigning for S3-family backends.
//!
//! OpenDAL covers whole-object writes; the multipart lifecycle (create,
//! presigned part URLs, list, complete, abort) goes through the AWS SDK so
//! clients can upload parts straight to the bucket.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::presigning::{PresignedRequest, PresigningConfig};
use chrono::{TimeDelta, Utc};
use stowage_shared::BackendKind;
use tracing::{debug, instrument};

use super::config::S3Settings;
use super::error::StorageError;
use super::types::{CompletedPart, PresignedUrl, RemotePart, strip_etag_quotes};

/// Metadata of a stored object as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    /// Entity tag, quotes stripped.
    pub etag: String,
    /// Size in bytes.
    pub size: u64,
}

/// Backend-native multipart lifecycle.
#[async_trait]
pub trait MultipartBackend: Send + Sync {
    /// Start a multipart upload, returning the backend's multipart id.
    async fn create_multipart(&self, key: &str, content_type: &str)
    -> Result<String, StorageError>;

    /// Presign an `UploadPart` request for one part number.
    async fn presign_upload_part(
        &self,
        key: &str,
        multipart_id: &str,
        part_number: u32,
        expires_in: Duration,
    ) -> Result<PresignedUrl, StorageError>;

    /// Presign a whole-object `PutObject` request.
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<PresignedUrl, StorageError>;

    /// Parts the backend has durably received, ascending by part number.
    async fn list_parts(&self, key: &str, multipart_id: &str)
    -> Result<Vec<RemotePart>, StorageError>;

    /// Complete a multipart upload, returning the final entity tag.
    async fn complete_multipart(
        &self,
        key: &str,
        multipart_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String, StorageError>;

    /// Abort a multipart upload. A multipart id the backend no longer knows
    /// yields `NotFound`.
    async fn abort_multipart(&self, key: &str, multipart_id: &str) -> Result<(), StorageError>;

    /// Entity tag and size of a stored object.
    async fn head_object(&self, key: &str) -> Result<ObjectHead, StorageError>;

    /// Public URL of an object.
    fn object_url(&self, key: &str) -> String;
}

/// S3-compatible multipart backend using the AWS SDK.
pub struct S3MultipartBackend {
    client: Client,
    settings: S3Settings,
    kind: BackendKind,
}

impl std::fmt::Debug for S3MultipartBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3MultipartBackend")
            .field("settings", &self.settings)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl S3MultipartBackend {
    /// Build a client for the given connection settings.
    ///
    /// Static credentials are used when configured; otherwise the ambient AWS
    /// credential chain is loaded.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if only one half of the static credentials is set.
    pub async fn new(settings: S3Settings, kind: BackendKind) -> Result<Self, StorageError> {
        let region = aws_config::Region::new(settings.region.clone());
        let mut builder = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(region.clone());

        match (&settings.access_key_id, &settings.secret_access_key) {
            (Some(key_id), Some(secret)) => {
                let credentials = aws_sdk_s3::config::Credentials::new(
                    key_id,
                    secret,
                    None,
                    None,
                    "stowage-config",
                );
                builder = builder.credentials_provider(credentials);
            }
            (None, None) => {
                let chain = aws_config::default_provider::credentials::DefaultCredentialsChain::builder()
                    .region(region)
                    .build()
                    .await;
                builder = builder.credentials_provider(chain);
            }
            _ => {
                return Err(StorageError::configuration(
                    "access_key_id and secret_access_key must be set together",
                ));
            }
        }

        if let Some(endpoint) = settings.endpoint_url() {
            builder = builder.endpoint_url(endpoint);
        }
        if settings.force_path_style {
            builder = builder.force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            settings,
            kind,
        })
    }

    fn presigning(expires_in: Duration) -> Result<PresigningConfig, StorageError> {
        PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::configuration(format!("invalid presign expiry: {e}")))
    }

    fn to_presigned_url(
        request: &PresignedRequest,
        expires_in: Duration,
    ) -> Result<PresignedUrl, StorageError> {
        let ttl = TimeDelta::from_std(expires_in)
            .map_err(|e| StorageError::configuration(format!("invalid presign expiry: {e}")))?;
        let headers: HashMap<String, String> = request
            .headers()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        Ok(PresignedUrl {
            url: request.uri().to_string(),
            method: request.method().to_string(),
            expires_at: Utc::now() + ttl,
            headers,
        })
    }

    /// Convert an AWS SDK error, mapping 404 responses to `NotFound`.
    fn map_sdk_error<E>(err: SdkError<E>, key: &str) -> StorageError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        if let SdkError::ServiceError(ref service_err) = err
            && service_err.raw().status().as_u16() == 404
        {
            return StorageError::not_found(key);
        }
        StorageError::remote(DisplayErrorContext(&err).to_string())
    }
}

fn part_number_to_i32(part_number: u32) -> Result<i32, StorageError> {
    i32::try_from(part_number)
        .map_err(|_| StorageError::remote(format!("part number {part_number} out of range")))
}

#[async_trait]
impl MultipartBackend for S3MultipartBackend {
    #[instrument(skip(self), fields(bucket = %self.settings.bucket))]
    async fn create_multipart(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.settings.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;

        let multipart_id = output
            .upload_id()
            .ok_or_else(|| StorageError::remote("backend returned no multipart upload id"))?
            .to_string();
        debug!(key = %key, multipart_id = %multipart_id, "Multipart upload created");
        Ok(multipart_id)
    }

    async fn presign_upload_part(
        &self,
        key: &str,
        multipart_id: &str,
        part_number: u32,
        expires_in: Duration,
    ) -> Result<PresignedUrl, StorageError> {
        let request = self
            .client
            .upload_part()
            .bucket(&self.settings.bucket)
            .key(key)
            .upload_id(multipart_id)
            .part_number(part_number_to_i32(part_number)?)
            .presigned(Self::presigning(expires_in)?)
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;

        Self::to_presigned_url(&request, expires_in)
    }

    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<PresignedUrl, StorageError> {
        let request = self
            .client
            .put_object()
            .bucket(&self.settings.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(Self::presigning(expires_in)?)
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;

        Self::to_presigned_url(&request, expires_in)
    }

    #[instrument(skip(self), fields(bucket = %self.settings.bucket))]
    async fn list_parts(
        &self,
        key: &str,
        multipart_id: &str,
    ) -> Result<Vec<RemotePart>, StorageError> {
        let mut parts = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let output = self
                .client
                .list_parts()
                .bucket(&self.settings.bucket)
                .key(key)
                .upload_id(multipart_id)
                .set_part_number_marker(marker.take())
                .send()
                .await
                .map_err(|e| Self::map_sdk_error(e, key))?;

            for part in output.parts() {
                let Some(part_number) = part.part_number().and_then(|n| u32::try_from(n).ok())
                else {
                    continue;
                };
                parts.push(RemotePart {
                    part_number,
                    etag: strip_etag_quotes(part.e_tag().unwrap_or_default()),
                    size: part.size().and_then(|s| u64::try_from(s).ok()).unwrap_or(0),
                });
            }

            match (output.is_truncated(), output.next_part_number_marker()) {
                (Some(true), Some(next)) => marker = Some(next.to_string()),
                _ => break,
            }
        }

        parts.sort_by_key(|part| part.part_number);
        parts.dedup_by_key(|part| part.part_number);
        Ok(parts)
    }

    #[instrument(skip(self, parts), fields(bucket = %self.settings.bucket, parts = parts.len()))]
    async fn complete_multipart(
        &self,
        key: &str,
        multipart_id: &str,
        parts: &[CompletedPart],
    ) -> Result<String, StorageError> {
        let completed = parts
            .iter()
            .map(|part| {
                Ok(aws_sdk_s3::types::CompletedPart::builder()
                    .part_number(part_number_to_i32(part.part_number)?)
                    .e_tag(&part.etag)
                    .build())
            })
            .collect::<Result<Vec<_>, StorageError>>()?;
        let upload = aws_sdk_s3::types::CompletedMultipartUpload::builder()
            .set_parts(Some(completed))
            .build();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(&self.settings.bucket)
            .key(key)
            .upload_id(multipart_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;

        Ok(strip_etag_quotes(output.e_tag().unwrap_or_default()))
    }

    #[instrument(skip(self), fields(bucket = %self.settings.bucket))]
    async fn abort_multipart(&self, key: &str, multipart_id: &str) -> Result<(), StorageError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.settings.bucket)
            .key(key)
            .upload_id(multipart_id)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;
        Ok(())
    }

    async fn head_object(&self, key: &str) -> Result<ObjectHead, StorageError> {
        let output = self
            .client
            .head_object()
            .bucket(&self.settings.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error(e, key))?;

        Ok(ObjectHead {
            etag: strip_etag_quotes(output.e_tag().unwrap_or_default()),
            size: output
                .content_length()
                .and_then(|len| u64::try_from(len).ok())
                .unwrap_or(0),
        })
    }

    fn object_url(&self, key: &str) -> String {
        self.settings.object_url(key)
    }
}
