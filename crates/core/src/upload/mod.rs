//! Resumable chunked uploads.
//!
//! This module implements the upload state machine:
//! - Part-size policy and strategy selection
//! - Write-once session records behind a key-value interface
//! - Chunk receiving and in-order assembly for server-mediated uploads
//! - Backend-native multipart coordination for object stores
//! - Finalize claims, cleanup markers and stale-session sweeps

pub mod assembler;
pub mod chunks;
pub mod config;
pub mod error;
pub mod kv;
pub mod multipart;
pub mod policy;
pub mod service;
pub mod session;
pub mod store;
pub mod strategy;

#[cfg(test)]
mod policy_props;

pub use chunks::ChunkStore;
pub use config::UploadConfig;
pub use error::{UploadError, UploadResult};
pub use kv::{FsKv, KvError, MemoryKv, SessionKv};
pub use multipart::MultipartCoordinator;
pub use policy::{BASE_PART_SIZE, MAX_PARTS, PartPlan, plan_parts};
pub use service::UploadService;
pub use session::{
    ChunkReceipt, CompleteUpload, CompletedUpload, InitiateUpload, UploadSession, UploadStatus,
};
pub use store::{CleanupMarker, CleanupStage, FinalizeOp, SessionStore};
pub use strategy::{UploadOperation, UploadStrategy, select_strategy};
