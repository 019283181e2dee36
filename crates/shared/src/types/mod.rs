//! Common types used across the application.

pub mod backend;
pub mod id;

pub use backend::BackendKind;
pub use id::*;
