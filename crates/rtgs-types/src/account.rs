//! Account rows
//!
//! An account is identified by a surrogate id and a unique IBAN. The balance
//! is an exact decimal and may only be mutated while the posting engine holds
//! the account's exclusive row lock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::Currency;

/// Invalid IBAN
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid IBAN: {iban}")]
pub struct InvalidIban {
    pub iban: String,
}

/// An International Bank Account Number.
///
/// Structural validation only: two uppercase letters, two check digits, then
/// up to 30 alphanumerics. Country-specific length tables and mod-97 checks
/// belong to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Iban(String);

impl Iban {
    pub fn new(iban: &str) -> Result<Self, InvalidIban> {
        let bytes = iban.as_bytes();
        let valid = bytes.len() >= 15
            && bytes.len() <= 34
            && bytes[..2].iter().all(|b| b.is_ascii_uppercase())
            && bytes[2..4].iter().all(|b| b.is_ascii_digit())
            && bytes[4..].iter().all(|b| b.is_ascii_alphanumeric());
        if !valid {
            return Err(InvalidIban {
                iban: iban.to_string(),
            });
        }
        Ok(Self(iban.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Iban {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Iban {
    type Error = InvalidIban;

    fn try_from(iban: String) -> Result<Self, Self::Error> {
        Self::new(&iban)
    }
}

impl From<Iban> for String {
    fn from(iban: Iban) -> Self {
        iban.0
    }
}

impl std::str::FromStr for Iban {
    type Err = InvalidIban;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A settlement account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Surrogate id
    pub id: crate::AccountId,
    /// Unique account number
    pub iban: Iban,
    /// Holder display name
    pub holder_name: String,
    /// Account currency, immutable after creation
    pub currency: Currency,
    /// Current balance
    pub balance: Decimal,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iban_shapes() {
        assert!(Iban::new("DE89370400440532013000").is_ok());
        assert!(Iban::new("GB29NWBK60161331926819").is_ok());
        // lowercase country code
        assert!(Iban::new("de89370400440532013000").is_err());
        // letters in check digits
        assert!(Iban::new("DEXX370400440532013000").is_err());
        // too short
        assert!(Iban::new("DE8937").is_err());
        // too long
        assert!(Iban::new(&format!("DE89{}", "0".repeat(31))).is_err());
    }
}
