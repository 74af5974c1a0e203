//! Compliance error types

use thiserror::Error;

/// Result type for screening operations
pub type ComplianceResult<T> = std::result::Result<T, ComplianceError>;

/// Compliance engine errors
#[derive(Debug, Clone, Error)]
pub enum ComplianceError {
    /// Sanctions provider failure
    #[error("Sanctions provider error: {0}")]
    Provider(String),

    /// A manual decision was submitted for a transfer not held for review
    #[error("Review replay: transfer {transfer_id} is {status}, expected BLOCKED_AML")]
    ReviewReplay { transfer_id: String, status: String },

    /// Referenced transfer does not exist
    #[error("Transfer not found: {transfer_id}")]
    TransferNotFound { transfer_id: String },

    /// State transition failed in the settlement store
    #[error("Screening state error: {0}")]
    State(String),
}

impl From<rtgs_payments::PaymentError> for ComplianceError {
    fn from(e: rtgs_payments::PaymentError) -> Self {
        match e {
            rtgs_payments::PaymentError::TransferNotFound { transfer_id } => {
                Self::TransferNotFound { transfer_id }
            }
            other => Self::State(other.to_string()),
        }
    }
}
