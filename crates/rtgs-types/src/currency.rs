//! Currency codes
//!
//! ISO 4217 alphabetic codes. The engine never converts between currencies;
//! a transfer settles only when the request currency matches both accounts.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Invalid currency code
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid currency code: {code}")]
pub struct InvalidCurrency {
    pub code: String,
}

/// An ISO 4217 currency code (three uppercase ASCII letters)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency([u8; 3]);

impl Currency {
    /// Parse and validate a currency code
    pub fn new(code: &str) -> Result<Self, InvalidCurrency> {
        let bytes = code.as_bytes();
        if bytes.len() != 3 || !bytes.iter().all(|b| b.is_ascii_uppercase()) {
            return Err(InvalidCurrency {
                code: code.to_string(),
            });
        }
        Ok(Self([bytes[0], bytes[1], bytes[2]]))
    }

    pub fn as_str(&self) -> &str {
        // Construction guarantees ASCII uppercase.
        std::str::from_utf8(&self.0).unwrap_or("???")
    }

    pub fn eur() -> Self {
        Self(*b"EUR")
    }

    pub fn usd() -> Self {
        Self(*b"USD")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for Currency {
    type Error = InvalidCurrency;

    fn try_from(code: String) -> Result<Self, Self::Error> {
        Self::new(&code)
    }
}

impl From<Currency> for String {
    fn from(c: Currency) -> Self {
        c.as_str().to_string()
    }
}

impl std::str::FromStr for Currency {
    type Err = InvalidCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_codes() {
        assert_eq!(Currency::new("EUR").unwrap(), Currency::eur());
        assert_eq!(Currency::new("GBP").unwrap().as_str(), "GBP");
    }

    #[test]
    fn test_invalid_codes() {
        for code in ["eur", "EU", "EURO", "E1R", ""] {
            assert!(Currency::new(code).is_err(), "{code} should be rejected");
        }
    }

    #[test]
    fn test_serde_roundtrip() {
        let json = serde_json::to_string(&Currency::eur()).unwrap();
        assert_eq!(json, "\"EUR\"");
        let back: Currency = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Currency::eur());
        assert!(serde_json::from_str::<Currency>("\"eu\"").is_err());
    }
}
