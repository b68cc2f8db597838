//! Error types for the audit crate.

use thiserror::Error;

/// Errors that can occur during audit operations.
///
/// None of these escape the public write operations of
/// [`AuditTrail`](crate::AuditTrail); they surface from stores, sinks and
/// low-level record construction.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A record was started with an empty or blank action.
    #[error("audit action must not be empty")]
    EmptyAction,

    /// The configuration cannot run.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] trail_core::ConfigError),

    /// Failed to initialize a store or sink.
    #[error("failed to initialize audit component: {0}")]
    InitializationFailed(String),

    /// Failed to query audit records.
    #[error("failed to query audit records: {0}")]
    QueryFailed(String),

    /// Storage error.
    #[error("storage error: {0}")]
    StorageError(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
