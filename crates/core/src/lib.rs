//! Core upload logic for Stowage.
//!
//! This crate contains the upload state machine and storage adapters with
//! ZERO web dependencies.
//!
//! # Modules
//!
//! - `storage` - Object stores, S3 multipart backend, URL synthesis, profiles
//! - `upload` - Sessions, chunk receiving, assembly, multipart coordination

pub mod storage;
pub mod upload;
