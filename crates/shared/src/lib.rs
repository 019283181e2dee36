//! Shared types, errors, and configuration for Stowage.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for upload sessions
//! - The closed set of storage backend kinds
//! - Application-wide error types
//! - Layered configuration loading

pub mod config;
pub mod error;
pub mod types;

pub use config::{LoggingConfig, ServerConfig, load_config, load_config_from};
pub use error::AppError;
pub use types::{BackendKind, UploadId};
