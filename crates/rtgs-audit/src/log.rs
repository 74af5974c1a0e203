//! Audit log service
//!
//! Thin orchestration over the store: canonicalizes payloads before they are
//! hashed, re-walks chains for verification, and offers a best-effort append
//! for call sites where an audit failure must not fail the business path.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, warn};

use crate::{AuditRecord, AuditResult, AuditStore};

/// Append and verify hash-chained audit records
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn AuditStore>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    /// Append a record to the entity's chain.
    ///
    /// Payload values must carry timestamps as RFC 3339 strings and decimal
    /// amounts as normalized strings; the canonical form is hashed as-is.
    /// Errors surface to the caller, which may log them but must not retry
    /// against the same chain head.
    pub async fn append(
        &self,
        entity_type: &str,
        entity_id: &str,
        action: &str,
        payload: &Value,
    ) -> AuditResult<AuditRecord> {
        let canonical = rtgs_hashchain::canonicalize(payload);
        self.store
            .append(entity_type, entity_id, action, canonical)
            .await
    }

    /// Append, logging instead of failing.
    ///
    /// Used on the posting and publishing paths where the audit append is
    /// observability-critical but never business-fatal.
    pub async fn append_best_effort(
        &self,
        entity_type: &str,
        entity_id: &str,
        action: &str,
        payload: &Value,
    ) {
        if let Err(e) = self.append(entity_type, entity_id, action, payload).await {
            warn!(
                entity_type,
                entity_id, action, error = %e,
                "audit append failed; business path continues"
            );
        }
    }

    /// Re-walk a chain and recompute every link.
    ///
    /// Returns false on the first mismatch: a broken link, a wrong root, or
    /// a prev hash that does not equal its predecessor's curr hash.
    pub async fn verify(&self, entity_type: &str, entity_id: &str) -> AuditResult<bool> {
        let records = self.store.records(entity_type, entity_id).await?;
        let mut prev = rtgs_hashchain::zero();
        for record in &records {
            if record.prev_hash != prev {
                error!(
                    entity_type,
                    entity_id,
                    record_id = %record.id,
                    "audit chain broken: prev hash mismatch"
                );
                return Ok(false);
            }
            if rtgs_hashchain::link(&record.payload, &record.prev_hash) != record.curr_hash {
                error!(
                    entity_type,
                    entity_id,
                    record_id = %record.id,
                    "audit chain broken: link mismatch"
                );
                return Ok(false);
            }
            prev = record.curr_hash.clone();
        }
        Ok(true)
    }

    /// Chronological export of one chain
    pub async fn records(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> AuditResult<Vec<AuditRecord>> {
        self.store.records(entity_type, entity_id).await
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }
}
