//! PostgreSQL sanctions repository
//!
//! Ingestion upserts on the `(normalized_name, source)` key; the matcher's
//! full-table pass runs on trigram similarity over the GIN-indexed
//! normalized name. Normalization happens here through the screening
//! crate's function, the same bytes the matcher compares against.

use async_trait::async_trait;
use sqlx::PgPool;

use rtgs_screening::{normalize, ComplianceError, ComplianceResult, SanctionsProvider};
use rtgs_types::{SanctionEntry, SanctionId, SanctionSource};

use crate::models::DbSanction;
use crate::{DbError, DbResult};

const SANCTION_COLUMNS: &str = "id, name, normalized_name, source, risk_score, listed_at";

/// Candidate cap for one similarity query
const CANDIDATE_LIMIT: i64 = 200;

/// Sanctions repository over a PostgreSQL pool
#[derive(Clone)]
pub struct PgSanctionsRepo {
    pool: PgPool,
    /// BK-tree membership floor, matching the matcher configuration
    high_risk_min_score: i16,
}

impl PgSanctionsRepo {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            high_risk_min_score: 75,
        }
    }

    /// Insert or refresh one list entry
    pub async fn upsert(
        &self,
        name: &str,
        source: SanctionSource,
        risk_score: u8,
    ) -> DbResult<SanctionEntry> {
        let normalized = normalize(name);
        let row = sqlx::query_as::<_, DbSanction>(&format!(
            r#"
            INSERT INTO sanctions (name, normalized_name, source, risk_score)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (normalized_name, source)
            DO UPDATE SET name = EXCLUDED.name, risk_score = EXCLUDED.risk_score
            RETURNING {SANCTION_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(&normalized)
        .bind(source.as_str())
        .bind(i16::from(risk_score))
        .fetch_one(&self.pool)
        .await?;
        SanctionEntry::try_from(row)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sanctions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    fn domain(row: DbSanction) -> ComplianceResult<SanctionEntry> {
        SanctionEntry::try_from(row).map_err(|e: DbError| ComplianceError::Provider(e.to_string()))
    }
}

#[async_trait]
impl SanctionsProvider for PgSanctionsRepo {
    async fn high_risk_entries(&self) -> ComplianceResult<Vec<SanctionEntry>> {
        let rows = sqlx::query_as::<_, DbSanction>(&format!(
            r#"
            SELECT {SANCTION_COLUMNS} FROM sanctions
            WHERE risk_score >= $1 OR source IN ('OFAC', 'UN')
            "#
        ))
        .bind(self.high_risk_min_score)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ComplianceError::Provider(e.to_string()))?;
        rows.into_iter().map(Self::domain).collect()
    }

    async fn similar_candidates(
        &self,
        normalized: &str,
        min_similarity: u8,
    ) -> ComplianceResult<Vec<SanctionEntry>> {
        let rows = sqlx::query_as::<_, DbSanction>(&format!(
            r#"
            SELECT {SANCTION_COLUMNS} FROM sanctions
            WHERE similarity(normalized_name, $1) >= $2
            ORDER BY similarity(normalized_name, $1) DESC
            LIMIT $3
            "#
        ))
        .bind(normalized)
        .bind(f32::from(min_similarity) / 100.0)
        .bind(CANDIDATE_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ComplianceError::Provider(e.to_string()))?;
        rows.into_iter().map(Self::domain).collect()
    }

    async fn entry(&self, id: SanctionId) -> ComplianceResult<Option<SanctionEntry>> {
        let row = sqlx::query_as::<_, DbSanction>(&format!(
            "SELECT {SANCTION_COLUMNS} FROM sanctions WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ComplianceError::Provider(e.to_string()))?;
        row.map(Self::domain).transpose()
    }
}
