//! PostgreSQL audit store
//!
//! Each append runs in its own transaction under a per-chain advisory lock,
//! so appends to one entity are serialized and never ride inside a business
//! transaction. Links are computed through `rtgs_hashchain`, same as the
//! in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use rtgs_audit::{AuditError, AuditRecord, AuditResult, AuditStore, EntityRef};

use crate::models::DbAuditRecord;

const AUDIT_COLUMNS: &str =
    "id, entity_type, entity_id, action, payload, prev_hash, curr_hash, created_at";

/// Audit store over a PostgreSQL pool
#[derive(Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append(
        &self,
        entity_type: &str,
        entity_id: &str,
        action: &str,
        canonical_payload: String,
    ) -> AuditResult<AuditRecord> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AuditError::Store(e.to_string()))?;

        // One writer per chain at a time; released at commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1 || '/' || $2))")
            .bind(entity_type)
            .bind(entity_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AuditError::Store(e.to_string()))?;

        let last = sqlx::query_as::<_, DbAuditRecord>(&format!(
            r#"
            SELECT {AUDIT_COLUMNS} FROM audit_logs
            WHERE entity_type = $1 AND entity_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(entity_type)
        .bind(entity_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AuditError::Store(e.to_string()))?;

        let prev_hash = last
            .as_ref()
            .map(|r| r.curr_hash.trim().to_string())
            .unwrap_or_else(rtgs_hashchain::zero);
        let curr_hash = rtgs_hashchain::link(&canonical_payload, &prev_hash);

        // Keep created_at monotonic within the chain.
        let now = Utc::now();
        let created_at: DateTime<Utc> = match last.as_ref() {
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

        sqlx::query(
            r#"
            INSERT INTO audit_logs
                (id, entity_type, entity_id, action, payload, prev_hash, curr_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(&record.entity_type)
        .bind(&record.entity_id)
        .bind(&record.action)
        .bind(&record.payload)
        .bind(&record.prev_hash)
        .bind(&record.curr_hash)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AuditError::Store(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| AuditError::Store(e.to_string()))?;
        Ok(record)
    }

    async fn records(&self, entity_type: &str, entity_id: &str) -> AuditResult<Vec<AuditRecord>> {
        let rows = sqlx::query_as::<_, DbAuditRecord>(&format!(
            r#"
            SELECT {AUDIT_COLUMNS} FROM audit_logs
            WHERE entity_type = $1 AND entity_id = $2
            ORDER BY created_at ASC
            "#
        ))
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuditError::Store(e.to_string()))?;
        Ok(rows.into_iter().map(AuditRecord::from).collect())
    }

    async fn entities_active_since(&self, since: DateTime<Utc>) -> AuditResult<Vec<EntityRef>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT DISTINCT entity_type, entity_id FROM audit_logs
            WHERE created_at >= $1
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuditError::Store(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|(entity_type, entity_id)| EntityRef::new(entity_type, entity_id))
            .collect())
    }

    async fn all_entities(&self) -> AuditResult<Vec<EntityRef>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT DISTINCT entity_type, entity_id FROM audit_logs")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| AuditError::Store(e.to_string()))?;
        Ok(rows
            .into_iter()
            .map(|(entity_type, entity_id)| EntityRef::new(entity_type, entity_id))
            .collect())
    }
}
