//! Pipeline error types

use thiserror::Error;

/// Result type for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Ingestion pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Message(#[from] rtgs_iso20022::MessageError),

    #[error(transparent)]
    Payment(#[from] rtgs_payments::PaymentError),

    #[error(transparent)]
    Compliance(#[from] rtgs_screening::ComplianceError),

    #[error("Queue error: {0}")]
    Queue(String),
}
