//! Database error types and driver error classification

use thiserror::Error;

use rtgs_payments::{ConflictKind, PaymentError};

/// Database operation errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;

/// SQLSTATE classes the posting retry loop treats as transient
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const LOCK_NOT_AVAILABLE: &str = "55P03";
/// Unique-index violation
pub const UNIQUE_VIOLATION: &str = "23505";

/// True when the driver error is a unique violation on the given index
pub fn is_unique_violation(e: &sqlx::Error, index: &str) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some(UNIQUE_VIOLATION)
                && db.constraint().map(|c| c.contains(index)).unwrap_or(true)
        }
        _ => false,
    }
}

/// Map a driver error onto the payment engine's error taxonomy.
/// Conflict-class SQLSTATEs become retryable; everything else is terminal.
pub fn payment_error(e: sqlx::Error) -> PaymentError {
    if let sqlx::Error::Database(db) = &e {
        match db.code().as_deref() {
            Some(SERIALIZATION_FAILURE) => {
                return PaymentError::Conflict(ConflictKind::SerializationFailure)
            }
            Some(DEADLOCK_DETECTED) => {
                return PaymentError::Conflict(ConflictKind::DeadlockVictim)
            }
            Some(LOCK_NOT_AVAILABLE) => {
                return PaymentError::Conflict(ConflictKind::LockTimeout)
            }
            _ => {}
        }
    }
    PaymentError::Store(e.to_string())
}
