//! Ledger entries
//!
//! Every cleared transfer produces exactly one debit and one credit, created
//! inside the same transaction that transitions the transfer to CLEARED.
//! Invariant: per transfer, credits minus debits sum to zero.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AccountId, EntryId, TransferId};

/// Side of a double-entry movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    /// Decrease of the account balance
    Debit,
    /// Increase of the account balance
    Credit,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "DEBIT",
            Self::Credit => "CREDIT",
        }
    }
}

impl std::str::FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBIT" => Ok(Self::Debit),
            "CREDIT" => Ok(Self::Credit),
            _ => Err(format!("Invalid entry type: {}", s)),
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One side of a double-entry ledger movement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    /// Owning transfer
    pub transfer_id: TransferId,
    /// Affected account
    pub account_id: AccountId,
    pub entry_type: EntryType,
    /// Always positive; the sign is carried by `entry_type`
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Signed contribution of this entry to the zero-sum invariant
    pub fn signed_amount(&self) -> Decimal {
        match self.entry_type {
            EntryType::Credit => self.amount,
            EntryType::Debit => -self.amount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry(entry_type: EntryType, amount: Decimal) -> LedgerEntry {
        LedgerEntry {
            id: EntryId::new(),
            transfer_id: TransferId::new(),
            account_id: AccountId::new(),
            entry_type,
            amount,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_signed_amounts_cancel() {
        let debit = entry(EntryType::Debit, dec!(500.25));
        let credit = entry(EntryType::Credit, dec!(500.25));
        assert_eq!(debit.signed_amount() + credit.signed_amount(), dec!(0));
    }

    #[test]
    fn test_entry_type_parsing() {
        assert_eq!("DEBIT".parse::<EntryType>().unwrap(), EntryType::Debit);
        assert_eq!("CREDIT".parse::<EntryType>().unwrap(), EntryType::Credit);
        assert!("TRANSFER".parse::<EntryType>().is_err());
    }
}
