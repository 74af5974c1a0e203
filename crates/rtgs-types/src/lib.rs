//! RTGS Types - Canonical domain types for the settlement engine
//!
//! This crate contains all foundational types for the RTGS core with zero
//! dependencies on other rtgs crates. It defines the type system for:
//!
//! - Identity types (AccountId, TransferId, SanctionId)
//! - Currency and IBAN types with validation
//! - Account, transfer, and ledger-entry rows
//! - Sanctions entries and screening parties
//! - Transfer event summaries for the real-time channel
//!
//! # Architectural Invariants
//!
//! These types back the core settlement invariants:
//!
//! 1. Every transfer settles exactly once per source message id
//! 2. Every cleared transfer carries a matched debit/credit pair
//! 3. Terminal transfers (CLEARED, REJECTED) are immutable
//! 4. Account currency is fixed at creation

pub mod account;
pub mod currency;
pub mod events;
pub mod identity;
pub mod ledger;
pub mod sanctions;
pub mod transfer;

pub use account::*;
pub use currency::*;
pub use events::*;
pub use identity::*;
pub use ledger::*;
pub use sanctions::*;
pub use transfer::*;

/// Version of the RTGS types schema
pub const TYPES_VERSION: &str = "0.1.0";
