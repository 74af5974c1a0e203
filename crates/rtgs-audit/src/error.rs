//! Audit error types

use thiserror::Error;

/// Result type for audit operations
pub type AuditResult<T> = std::result::Result<T, AuditError>;

/// Audit log errors
#[derive(Debug, Clone, Error)]
pub enum AuditError {
    /// The store rejected an append because another writer extended the
    /// chain first. Callers must re-read the chain head; retrying with the
    /// same prev hash would fork the chain.
    #[error("Chain fork rejected for {entity}: stale prev hash {prev_hash}")]
    ChainFork { entity: String, prev_hash: String },

    /// Underlying store failure
    #[error("Audit store error: {0}")]
    Store(String),

    /// Payload could not be serialized
    #[error("Audit payload serialization error: {0}")]
    Serialization(String),
}
