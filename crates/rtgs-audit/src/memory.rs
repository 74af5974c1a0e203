//! In-memory audit store
//!
//! Backs unit and scenario tests; the daemon uses the PostgreSQL store. The
//! single map mutex serializes appends across all chains, which satisfies
//! the per-entity serialization requirement trivially.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{AuditError, AuditRecord, AuditResult, AuditStore, EntityRef};

/// Map-backed audit store
#[derive(Clone, Default)]
pub struct MemoryAuditStore {
    chains: Arc<Mutex<HashMap<EntityRef, Vec<AuditRecord>>>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a stored record's payload in place.
    ///
    /// Test support for tamper-detection drills; the trait offers no
    /// mutation path.
    pub async fn corrupt_payload(
        &self,
        entity_type: &str,
        entity_id: &str,
        index: usize,
        payload: String,
    ) -> AuditResult<()> {
        let mut chains = self.chains.lock().await;
        let entity = EntityRef::new(entity_type, entity_id);
        let chain = chains
            .get_mut(&entity)
            .ok_or_else(|| AuditError::Store(format!("no chain for {}", entity)))?;
        let record = chain
            .get_mut(index)
            .ok_or_else(|| AuditError::Store(format!("no record {} for {}", index, entity)))?;
        record.payload = payload;
        Ok(())
    }

    pub async fn record_count(&self) -> usize {
        self.chains.lock().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn append(
        &self,
        entity_type: &str,
        entity_id: &str,
        action: &str,
        canonical_payload: String,
    ) -> AuditResult<AuditRecord> {
        let mut chains = self.chains.lock().await;
        let entity = EntityRef::new(entity_type, entity_id);
        let chain = chains.entry(entity).or_default();

        let prev_hash = chain
            .last()
            .map(|r| r.curr_hash.clone())
            .unwrap_or_else(rtgs_hashchain::zero);
        let curr_hash = rtgs_hashchain::link(&canonical_payload, &prev_hash);

        // created_at must stay monotonic within the chain even when two
        // appends land in the same clock tick.
        let now = Utc::now();
        let created_at = match chain.last() {
            Some(last) if last.created_at >= now => last.created_at + Duration::microseconds(1),
            _ => now,
        };

        let record = AuditRecord {
            id: Uuid::new_v4(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            action: action.to_string(),
            payload: canonical_payload,
            prev_hash,
            curr_hash,
            created_at,
        };
        chain.push(record.clone());
        Ok(record)
    }

    async fn records(&self, entity_type: &str, entity_id: &str) -> AuditResult<Vec<AuditRecord>> {
        let chains = self.chains.lock().await;
        Ok(chains
            .get(&EntityRef::new(entity_type, entity_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn entities_active_since(&self, since: DateTime<Utc>) -> AuditResult<Vec<EntityRef>> {
        let chains = self.chains.lock().await;
        Ok(chains
            .iter()
            .filter(|(_, records)| records.iter().any(|r| r.created_at >= since))
            .map(|(entity, _)| entity.clone())
            .collect())
    }

    async fn all_entities(&self) -> AuditResult<Vec<EntityRef>> {
        let chains = self.chains.lock().await;
        Ok(chains.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_links_chain() {
        let store = MemoryAuditStore::new();
        let first = store
            .append("transfer", "t-1", "RECEIVED", "{\"a\":1}".to_string())
            .await
            .unwrap();
        let second = store
            .append("transfer", "t-1", "CLEARED", "{\"a\":2}".to_string())
            .await
            .unwrap();

        assert_eq!(first.prev_hash, rtgs_hashchain::zero());
        assert_eq!(second.prev_hash, first.curr_hash);
        assert!(first.verify_link());
        assert!(second.verify_link());
    }

    #[tokio::test]
    async fn test_chains_are_independent() {
        let store = MemoryAuditStore::new();
        store
            .append("transfer", "t-1", "RECEIVED", "{}".to_string())
            .await
            .unwrap();
        let other = store
            .append("account", "a-1", "OPENED", "{}".to_string())
            .await
            .unwrap();
        assert_eq!(other.prev_hash, rtgs_hashchain::zero());
        assert_eq!(store.record_count().await, 2);
    }

    #[tokio::test]
    async fn test_created_at_monotonic_per_chain() {
        let store = MemoryAuditStore::new();
        for i in 0..10 {
            store
                .append("transfer", "t-1", "STEP", format!("{{\"i\":{}}}", i))
                .await
                .unwrap();
        }
        let records = store.records("transfer", "t-1").await.unwrap();
        for pair in records.windows(2) {
            assert!(pair[0].created_at < pair[1].created_at);
        }
    }
}
