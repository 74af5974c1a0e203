//! Audit record rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one audit chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_type: String,
    pub entity_id: String,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// One link of an audit chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: String,
    /// Verb describing what happened (e.g. `CLEARED`, `DUPLICATE_ATTEMPT`)
    pub action: String,
    /// Canonical JSON string; input to the chain hash
    pub payload: String,
    /// `curr_hash` of the previous record, or the zero hash for the first
    pub prev_hash: String,
    /// `SHA256(payload || prev_hash)` in lowercase hex
    pub curr_hash: String,
    /// Monotonic within a chain
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn entity(&self) -> EntityRef {
        EntityRef::new(self.entity_type.clone(), self.entity_id.clone())
    }

    /// Recompute the link and compare; false means this record or its
    /// predecessor was altered.
    pub fn verify_link(&self) -> bool {
        rtgs_hashchain::link(&self.payload, &self.prev_hash) == self.curr_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_link_detects_payload_change() {
        let payload = r#"{"action":"CLEARED"}"#.to_string();
        let prev = rtgs_hashchain::zero();
        let curr = rtgs_hashchain::link(&payload, &prev);
        let mut record = AuditRecord {
            id: Uuid::new_v4(),
            entity_type: "transfer".to_string(),
            entity_id: "t-1".to_string(),
            action: "CLEARED".to_string(),
            payload,
            prev_hash: prev,
            curr_hash: curr,
            created_at: Utc::now(),
        };
        assert!(record.verify_link());

        record.payload = record.payload.replace("CLEARED", "CLEANED");
        assert!(!record.verify_link());
    }
}
