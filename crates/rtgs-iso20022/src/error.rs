//! Wire format error types

use thiserror::Error;

/// Result type for message codec operations
pub type MessageResult<T> = std::result::Result<T, MessageError>;

/// pacs message errors
#[derive(Debug, Clone, Error)]
pub enum MessageError {
    /// The payload is not well-formed XML
    #[error("Invalid XML: {0}")]
    InvalidXml(String),

    /// Well-formed XML that violates the pacs.008 structure
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// Failed to serialize an outbound report
    #[error("Write error: {0}")]
    Write(String),
}

impl MessageError {
    pub fn missing(path: &str) -> Self {
        Self::SchemaViolation(format!("missing required element {}", path))
    }
}
