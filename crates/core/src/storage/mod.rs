//! Storage backends for uploaded objects.
//!
//! Whole-object writes go through Apache OpenDAL; S3-family backends also get
//! a native multipart backend built on the AWS SDK.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       StorageResolver                           │
//! │          storage config id -> StorageHandle (cached)            │
//! ├────────────────────────────────┬────────────────────────────────┤
//! │ ObjectStore (OpenDAL)          │ MultipartBackend (AWS SDK)     │
//! │ put_object / delete_object     │ create / presign / list        │
//! │ LOCAL, WEBDAV, S3, OSS         │ complete / abort  (S3, OSS)    │
//! └────────────────────────────────┴────────────────────────────────┘
//! ```

mod config;
#[cfg(test)]
pub(crate) mod dav_server;
mod error;
mod key;
mod resolver;
mod s3;
mod service;
mod types;
mod url;

pub use config::{S3Settings, StorageProfiles, StorageProvider};
pub use error::StorageError;
pub use key::{is_safe_segment, object_key, sanitize_file_name};
pub use resolver::{ProfileResolver, StorageHandle, StorageResolver};
pub use s3::{MultipartBackend, ObjectHead, S3MultipartBackend};
pub use service::{ObjectStore, StorageService};
pub use types::{
    CompletedPart, ObjectSource, PresignedUrl, PutObjectRequest, RemotePart, StoredObject,
    strip_etag_quotes,
};
pub use url::{local_object_url, object_url, webdav_object_url};
