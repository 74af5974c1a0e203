//! RTGS Audit - Immutable hash-chained audit log
//!
//! All consequential actions produce audit records. The log is append-only
//! and cryptographically verifiable: for each `(entity_type, entity_id)` the
//! records form a SHA-256 chain rooted at the all-zero hash, so any mutation
//! of a stored record invalidates every downstream link.
//!
//! # Invariants
//!
//! 1. Records are insert-only; mutation indicates tampering
//! 2. `curr_hash = SHA256(canonical_payload || prev_hash)`
//! 3. Appends to the same entity are serialized by the store
//! 4. An audit append commits independently of any business transaction:
//!    a rolled-back posting still leaves its attempt on the chain
//!
//! The scheduled verifier re-walks chains out of band and raises an alert on
//! the first broken link of each chain.

pub mod error;
pub mod log;
pub mod memory;
pub mod record;
pub mod store;
pub mod verifier;

pub use error::{AuditError, AuditResult};
pub use log::AuditLog;
pub use memory::MemoryAuditStore;
pub use record::{AuditRecord, EntityRef};
pub use store::AuditStore;
pub use verifier::{
    AlertSink, ChainVerifier, TracingAlertSink, VerificationResult, VerifierConfig,
};
