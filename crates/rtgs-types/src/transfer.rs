//! Transfer rows and lifecycle
//!
//! A transfer is created `PENDING` by the ingestion pipeline and transitioned
//! by the compliance screener or the payment engine only. Once terminal
//! (`CLEARED` or `REJECTED`) it is immutable; `BLOCKED_AML` is the only
//! non-terminal state open to manual review.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, Currency, Iban, TransferId};

/// Lifecycle state of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    /// Created, awaiting compliance and posting
    #[default]
    Pending,
    /// Held by the compliance screen, awaiting manual review
    BlockedAml,
    /// Settled with finality; ledger entries exist
    Cleared,
    /// Terminally rejected; no ledger entries exist
    Rejected,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::BlockedAml => "BLOCKED_AML",
            Self::Cleared => "CLEARED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Terminal states forbid any further mutation
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cleared | Self::Rejected)
    }
}

impl std::str::FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "BLOCKED_AML" => Ok(Self::BlockedAml),
            "CLEARED" => Ok(Self::Cleared),
            "REJECTED" => Ok(Self::Rejected),
            _ => Err(format!("Invalid transfer status: {}", s)),
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A credit transfer between two accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    /// Surrogate id
    pub id: TransferId,
    /// External message id; globally unique per source message
    pub msg_id: String,
    /// Debited account
    pub source_account_id: AccountId,
    /// Credited account
    pub destination_account_id: AccountId,
    /// Positive settlement amount
    pub amount: Decimal,
    /// Settlement currency
    pub currency: Currency,
    /// Lifecycle state
    pub status: TransferStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Set when the transfer reaches a terminal state
    pub completed_at: Option<DateTime<Utc>>,
}

/// A party to be screened (debtor or creditor)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// Free-text name as carried on the wire
    pub name: String,
    /// Account number of the party
    pub iban: Iban,
}

/// Internal projection of an inbound credit-transfer instruction.
///
/// Produced by the ingestion layer from a validated pacs.008; consumed by the
/// compliance screener and the payment engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferInstruction {
    /// Source message id, the idempotency key
    pub msg_id: String,
    /// End-to-end id supplied by the originator
    pub end_to_end_id: String,
    /// Settlement amount
    pub amount: Decimal,
    /// Settlement currency
    pub currency: Currency,
    /// Party to debit
    pub debtor: Party,
    /// Party to credit
    pub creditor: Party,
}

/// Decision submitted by a human reviewer for a BLOCKED_AML transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    /// Release the transfer back to PENDING for posting
    Approve,
    /// Terminally reject the transfer
    Reject,
}

impl ReviewDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "APPROVE",
            Self::Reject => "REJECT",
        }
    }
}

impl std::fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_display_and_parsing() {
        let statuses = [
            (TransferStatus::Pending, "PENDING"),
            (TransferStatus::BlockedAml, "BLOCKED_AML"),
            (TransferStatus::Cleared, "CLEARED"),
            (TransferStatus::Rejected, "REJECTED"),
        ];

        for (status, string) in statuses {
            assert_eq!(status.as_str(), string);
            assert_eq!(status.to_string(), string);
            assert_eq!(TransferStatus::from_str(string).unwrap(), status);
        }

        assert!(TransferStatus::from_str("SETTLED").is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TransferStatus::Pending.is_terminal());
        assert!(!TransferStatus::BlockedAml.is_terminal());
        assert!(TransferStatus::Cleared.is_terminal());
        assert!(TransferStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_status_serde_uses_wire_form() {
        let json = serde_json::to_string(&TransferStatus::BlockedAml).unwrap();
        assert_eq!(json, "\"BLOCKED_AML\"");
    }
}
