//! Payment error types

use thiserror::Error;

/// Result type for payment operations
pub type PaymentResult<T> = std::result::Result<T, PaymentError>;

/// Conflict class surfaced by the store; all are safe to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    LockTimeout,
    DeadlockVictim,
    SerializationFailure,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LockTimeout => "lock timeout",
            Self::DeadlockVictim => "deadlock victim",
            Self::SerializationFailure => "serialization failure",
        }
    }
}

/// Payment engine errors
#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    /// No account exists for the referenced IBAN
    #[error("Account not found: {iban}")]
    AccountNotFound { iban: String },

    /// Request is structurally valid but violates a settlement rule
    /// (currency mismatch, non-positive amount, replayed state transition)
    #[error("Invalid transfer: {reason}")]
    InvalidTransfer { reason: String },

    /// Locked source balance cannot cover the amount
    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: rust_decimal::Decimal,
        requested: rust_decimal::Decimal,
    },

    /// A transfer with this msg_id already exists; idempotent outcome
    #[error("Duplicate message: {msg_id}")]
    DuplicateMessage { msg_id: String },

    /// Zero-sum re-check failed inside the posting transaction.
    /// Fatal, never retried.
    #[error("Atomicity breach: ledger entries for transfer {transfer_id} sum to {sum}")]
    AtomicityBreach { transfer_id: String, sum: String },

    /// Transient conflict; retried up to the configured budget
    #[error("Transaction conflict ({})", .0.as_str())]
    Conflict(ConflictKind),

    /// Referenced transfer does not exist
    #[error("Transfer not found: {transfer_id}")]
    TransferNotFound { transfer_id: String },

    /// Underlying store failure
    #[error("Settlement store error: {0}")]
    Store(String),
}

impl PaymentError {
    /// Only conflict-class errors re-enter the retry loop
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
