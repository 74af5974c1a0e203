//! RTGS Payments - Transactional double-entry payment engine
//!
//! The engine posts each transfer all-or-nothing inside one transactional
//! scope:
//!
//! 1. Idempotency read by `msg_id`
//! 2. Account and currency validation
//! 3. Pending-transfer insert (the unique index is the authoritative
//!    duplicate gate)
//! 4. Pessimistic account locks in canonical id order
//! 5. Funds check on the locked source
//! 6. Matched debit/credit entries with an in-transaction zero-sum check
//! 7. Balance updates
//! 8. CLEARED finalization
//! 9. Audit
//! 10. Post-commit event publication
//!
//! Conflict-class failures (lock timeout, deadlock victim, serialization
//! failure) are retried with exponential backoff; everything else is not.

pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod memory;
pub mod store;

pub use config::PaymentConfig;
pub use engine::{
    NoopHook, PaymentEngine, PostCommitHook, PostOutcome, PostResponse, PrepareOutcome,
};
pub use error::{ConflictKind, PaymentError, PaymentResult};
pub use gate::{IdempotencyGate, IdempotencyVerdict};
pub use memory::MemorySettlementStore;
pub use store::{NewTransfer, SettlementStore, SettlementTx};
