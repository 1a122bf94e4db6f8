//! Faults surfaced by the persistent-storage driver.
//!
//! The driver itself lives outside this crate; adapters translate its native
//! errors into these kinds so the dispatcher can apply the storage rules.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Uniqueness constraint violated.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Could not reach the storage server.
    #[error("connection failed: {0}")]
    Connectivity(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Document rejected by the storage-side schema.
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    /// Identifier or value could not be cast to the stored type.
    #[error("malformed identifier: {0}")]
    MalformedIdentifier(String),

    #[error("{0}")]
    Other(String),
}
