//! Storage configuration types.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use stowage_shared::BackendKind;

use super::error::StorageError;

/// Connection parameters for S3-compatible backends (AWS S3, MinIO, R2, OSS).
#[derive(Clone, Serialize, Deserialize)]
pub struct S3Settings {
    /// Bucket name.
    pub bucket: String,
    /// Region, used for signing and for the default AWS URL pattern.
    #[serde(default = "default_region")]
    pub region: String,
    /// Access key ID. Falls back to the ambient AWS credential chain when unset.
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Secret access key.
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Explicit endpoint, with or without scheme (e.g. `minio:9000`).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Address objects as `endpoint/bucket/key` instead of `bucket.endpoint/key`.
    #[serde(default)]
    pub force_path_style: bool,
    /// Public base URL (CDN or custom domain) used for object URLs.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl S3Settings {
    /// Create settings for a bucket in a region, without explicit credentials.
    #[must_use]
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            access_key_id: None,
            secret_access_key: None,
            endpoint: None,
            force_path_style: false,
            public_base_url: None,
        }
    }

    /// Set static credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    /// Set an explicit endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Force path-style addressing.
    #[must_use]
    pub fn with_path_style(mut self, force_path_style: bool) -> Self {
        self.force_path_style = force_path_style;
        self
    }

    /// Endpoint as a full URL, prefixing `https://` when no scheme is present.
    #[must_use]
    pub fn endpoint_url(&self) -> Option<String> {
        self.endpoint.as_ref().map(|endpoint| {
            let lower = endpoint.to_ascii_lowercase();
            if lower.starts_with("http://") || lower.starts_with("https://") {
                endpoint.clone()
            } else {
                format!("https://{endpoint}")
            }
        })
    }
}

impl std::fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Settings")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("force_path_style", &self.force_path_style)
            .field("public_base_url", &self.public_base_url)
            .finish_non_exhaustive()
    }
}

/// Storage provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageProvider {
    /// Local filesystem.
    Local {
        /// Root directory path.
        root: PathBuf,
        /// Base URL the root directory is served from.
        #[serde(default)]
        public_base_url: Option<String>,
    },
    /// WebDAV server.
    Webdav {
        /// Server endpoint, e.g. `https://dav.example.com`.
        endpoint: String,
        /// Root path on the server.
        #[serde(default)]
        root: String,
        /// Basic auth username.
        #[serde(default)]
        username: Option<String>,
        /// Basic auth password.
        #[serde(default)]
        password: Option<String>,
        /// Base URL objects are publicly served from.
        #[serde(default)]
        public_base_url: Option<String>,
    },
    /// S3-compatible storage: AWS S3, MinIO, Cloudflare R2.
    S3(S3Settings),
    /// Aliyun OSS through its S3-compatible API.
    Oss(S3Settings),
}

impl StorageProvider {
    /// Create local filesystem provider.
    #[must_use]
    pub fn local_fs(root: impl Into<PathBuf>) -> Self {
        Self::Local {
            root: root.into(),
            public_base_url: None,
        }
    }

    /// Create WebDAV provider.
    #[must_use]
    pub fn webdav(endpoint: impl Into<String>, root: impl Into<String>) -> Self {
        Self::Webdav {
            endpoint: endpoint.into(),
            root: root.into(),
            username: None,
            password: None,
            public_base_url: None,
        }
    }

    /// Get the backend kind.
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Local { .. } => BackendKind::Local,
            Self::Webdav { .. } => BackendKind::Webdav,
            Self::S3(_) => BackendKind::S3,
            Self::Oss(_) => BackendKind::Oss,
        }
    }

    /// Get the S3 connection settings for S3-family providers.
    #[must_use]
    pub fn s3_settings(&self) -> Option<&S3Settings> {
        match self {
            Self::S3(settings) | Self::Oss(settings) => Some(settings),
            Self::Local { .. } | Self::Webdav { .. } => None,
        }
    }
}

/// Named storage profiles, addressed by a storage config ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageProfiles {
    /// Profile used when an upload names no storage config.
    pub default: String,
    /// Profiles by ID.
    #[serde(default)]
    pub profiles: HashMap<String, StorageProvider>,
}

impl StorageProfiles {
    /// Create a profile set with a single default profile.
    #[must_use]
    pub fn single(id: impl Into<String>, provider: StorageProvider) -> Self {
        let id = id.into();
        let mut profiles = HashMap::new();
        profiles.insert(id.clone(), provider);
        Self {
            default: id,
            profiles,
        }
    }

    /// Add a profile.
    #[must_use]
    pub fn with_profile(mut self, id: impl Into<String>, provider: StorageProvider) -> Self {
        self.profiles.insert(id.into(), provider);
        self
    }

    /// Resolve a storage config ID, falling back to the default profile.
    pub fn resolve(&self, id: Option<&str>) -> Result<(&str, &StorageProvider), StorageError> {
        let id = id.unwrap_or(&self.default);
        self.profiles
            .get_key_value(id)
            .map(|(id, provider)| (id.as_str(), provider))
            .ok_or_else(|| StorageError::unknown_profile(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_provider_kinds() {
        assert_eq!(StorageProvider::local_fs("./storage").kind(), BackendKind::Local);
        assert_eq!(
            StorageProvider::webdav("https://dav.example.com", "/uploads").kind(),
            BackendKind::Webdav
        );
        assert_eq!(
            StorageProvider::S3(S3Settings::new("b", "r")).kind(),
            BackendKind::S3
        );
        assert_eq!(
            StorageProvider::Oss(S3Settings::new("b", "oss-cn-hangzhou")).kind(),
            BackendKind::Oss
        );
    }

    #[test]
    fn test_s3_settings_only_for_object_stores() {
        assert!(StorageProvider::local_fs("./storage").s3_settings().is_none());
        let provider = StorageProvider::S3(S3Settings::new("artifacts", "eu-west-1"));
        assert_eq!(
            provider.s3_settings().map(|s| s.bucket.as_str()),
            Some("artifacts")
        );
    }

    #[test]
    fn test_endpoint_url_adds_scheme() {
        let settings = S3Settings::new("b", "r").with_endpoint("minio:9000");
        assert_eq!(settings.endpoint_url().as_deref(), Some("https://minio:9000"));

        let settings = S3Settings::new("b", "r").with_endpoint("http://minio:9000");
        assert_eq!(settings.endpoint_url().as_deref(), Some("http://minio:9000"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let settings = S3Settings::new("b", "r").with_credentials("AKIA", "super-secret");
        let debug = format!("{settings:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("AKIA"));
    }

    #[test]
    fn test_deserialize_tagged_provider() {
        let json = r#"{
            "type": "s3",
            "bucket": "artifacts",
            "endpoint": "minio:9000",
            "force_path_style": true
        }"#;
        let provider: StorageProvider = serde_json::from_str(json).expect("valid provider");
        let settings = provider.s3_settings().expect("s3 settings");
        assert_eq!(settings.region, "us-east-1");
        assert!(settings.force_path_style);
    }

    #[test]
    fn test_profiles_resolve() {
        let profiles = StorageProfiles::single("local", StorageProvider::local_fs("./storage"))
            .with_profile("minio", StorageProvider::S3(S3Settings::new("b", "r")));

        let (id, provider) = profiles.resolve(None).expect("default profile");
        assert_eq!(id, "local");
        assert_eq!(provider.kind(), BackendKind::Local);

        let (id, provider) = profiles.resolve(Some("minio")).expect("named profile");
        assert_eq!(id, "minio");
        assert_eq!(provider.kind(), BackendKind::S3);

        let err = profiles.resolve(Some("missing")).unwrap_err();
        assert!(matches!(err, StorageError::UnknownProfile(_)));
    }
}
