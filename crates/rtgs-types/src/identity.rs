//! Identity types
//!
//! Surrogate identifiers are UUIDs wrapped in newtypes so an account id can
//! never be passed where a transfer id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id! {
    /// Surrogate identifier for an account
    AccountId
}

uuid_id! {
    /// Surrogate identifier for a transfer
    TransferId
}

uuid_id! {
    /// Surrogate identifier for a ledger entry
    EntryId
}

uuid_id! {
    /// Surrogate identifier for a sanctions list entry
    SanctionId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_distinct_types_and_unique() {
        let a = AccountId::new();
        let b = AccountId::new();
        assert_ne!(a, b);
        assert_eq!(a, AccountId::from(a.0));
    }

    #[test]
    fn test_id_display_is_uuid() {
        let id = TransferId::new();
        assert_eq!(id.to_string(), id.0.to_string());
    }
}
