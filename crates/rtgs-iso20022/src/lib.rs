//! RTGS ISO 20022 - Credit-transfer wire formats
//!
//! Reads `pacs.008.001.10` (FI-to-FI customer credit transfer) into the
//! internal transfer instruction and writes `pacs.002.001.12` (payment
//! status report) for the outbound queue.
//!
//! Parsing is structural: required elements, a positive decimal amount, a
//! valid ISO 4217 currency, and IBAN shapes. Full XSD validation belongs to
//! the gateway in front of the broker.

pub mod error;
pub mod pacs002;
pub mod pacs008;

pub use error::{MessageError, MessageResult};
pub use pacs002::{ReportStatus, StatusReason, StatusReport};
pub use pacs008::{parse_pacs008, Pacs008};

/// Message-name identifier of the inbound credit transfer
pub const PACS008_MSG_NM_ID: &str = "pacs.008.001.10";
/// Namespace of the inbound credit transfer
pub const PACS008_NAMESPACE: &str = "urn:iso:std:iso:20022:tech:xsd:pacs.008.001.10";
/// Namespace of the outbound status report
pub const PACS002_NAMESPACE: &str = "urn:iso:std:iso:20022:tech:xsd:pacs.002.001.12";
