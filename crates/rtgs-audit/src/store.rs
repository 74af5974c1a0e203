//! Audit store trait
//!
//! The store owns chain atomicity: reading the last hash, computing the new
//! link, and inserting the record happen under a per-entity critical section
//! (a row lock on the latest record in PostgreSQL, a mutex in memory). Both
//! implementations compute links through `rtgs_hashchain` so the canonical
//! contract has exactly one definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{AuditRecord, AuditResult, EntityRef};

/// Persistence seam for audit chains
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append a record to the entity's chain.
    ///
    /// `canonical_payload` must already be in canonical form. The store
    /// reads the chain head, links the payload, and inserts atomically.
    /// Runs in its own transactional scope, never inside a business
    /// transaction.
    async fn append(
        &self,
        entity_type: &str,
        entity_id: &str,
        action: &str,
        canonical_payload: String,
    ) -> AuditResult<AuditRecord>;

    /// All records of one chain in chronological (chain) order
    async fn records(&self, entity_type: &str, entity_id: &str) -> AuditResult<Vec<AuditRecord>>;

    /// Chains that received at least one record since `since`
    async fn entities_active_since(&self, since: DateTime<Utc>) -> AuditResult<Vec<EntityRef>>;

    /// Every chain in the store
    async fn all_entities(&self) -> AuditResult<Vec<EntityRef>>;
}
