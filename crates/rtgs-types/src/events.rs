//! Transfer event summaries
//!
//! The payload published to the real-time channel after a transfer's
//! transaction commits. Field set matches the external WebSocket contract.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Iban, Transfer, TransferId, TransferStatus};

/// Committed-transfer summary for subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferEvent {
    pub transfer_id: TransferId,
    pub msg_id: String,
    pub status: TransferStatus,
    pub amount: Decimal,
    pub source_iban: Iban,
    pub destination_iban: Iban,
    pub created_at: DateTime<Utc>,
}

impl TransferEvent {
    /// Build the summary from a committed transfer and its account IBANs
    pub fn from_transfer(transfer: &Transfer, source_iban: Iban, destination_iban: Iban) -> Self {
        Self {
            transfer_id: transfer.id,
            msg_id: transfer.msg_id.clone(),
            status: transfer.status,
            amount: transfer.amount,
            source_iban,
            destination_iban,
            created_at: transfer.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_serializes_as_string() {
        let event = TransferEvent {
            transfer_id: TransferId::new(),
            msg_id: "m-1".to_string(),
            status: TransferStatus::Cleared,
            amount: dec!(500.00),
            source_iban: Iban::new("DE89370400440532013000").unwrap(),
            destination_iban: Iban::new("GB29NWBK60161331926819").unwrap(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["amount"], "500.00");
        assert_eq!(json["status"], "CLEARED");
    }
}
