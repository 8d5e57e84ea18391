//! # Capability Error
//!
//! Errors returned by a platform-service implementation (cache, storage,
//! vector store, LLM proxy, ...) back to the runtime's capability shims. The
//! shims translate `PermissionScope` into a `RuntimeError::PermissionDenied`
//! and everything else into `RuntimeError::HandlerError`, so this stays a
//! thin, provider-agnostic error shape rather than the taxonomy itself.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("permission denied: {0}")]
    PermissionScope(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend error: {0}")]
    Backend(String),
}
