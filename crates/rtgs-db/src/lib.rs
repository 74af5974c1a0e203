//! RTGS Database Layer
//!
//! PostgreSQL persistence for the settlement engine:
//!
//! - **Settlement store**: accounts, transfers, ledger entries with
//!   `SELECT ... FOR UPDATE` row locks taken in canonical id order
//! - **Audit store**: hash-chained records appended under a per-chain
//!   advisory lock, in their own transactions
//! - **Sanctions repository**: deduplicated upserts and trigram similarity
//!   queries backing the matcher's full-table pass
//!
//! All queries are runtime-checked `query_as` over a shared pool; the
//! `migrations/` directory carries the schema.

pub mod audit;
pub mod config;
pub mod error;
pub mod models;
pub mod sanctions;
pub mod settlement;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

pub use audit::PgAuditStore;
pub use config::DatabaseConfig;
pub use error::{DbError, DbResult};
pub use models::*;
pub use sanctions::PgSanctionsRepo;
pub use settlement::PgSettlementStore;

/// Database connection pool and store constructors
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        info!("Connecting to PostgreSQL: {}", config.postgres_url_masked());

        let lock_timeout_ms = config.lock_timeout_ms;
        let pool = PgPoolOptions::new()
            .max_connections(config.pg_max_connections)
            .min_connections(config.pg_min_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.pg_acquire_timeout_secs))
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    // Bounded lock waits so posting conflicts surface as
                    // retryable 55P03 errors instead of hanging workers.
                    sqlx::query(&format!("SET lock_timeout = '{}ms'", lock_timeout_ms))
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(&config.postgres_url)
            .await
            .map_err(|e| DbError::Connection(format!("PostgreSQL: {}", e)))?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> DbResult<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;
        info!("Migrations complete");
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await.is_ok()
    }

    pub fn settlement_store(&self) -> PgSettlementStore {
        PgSettlementStore::new(self.pool.clone())
    }

    pub fn audit_store(&self) -> PgAuditStore {
        PgAuditStore::new(self.pool.clone())
    }

    pub fn sanctions_repo(&self) -> PgSanctionsRepo {
        PgSanctionsRepo::new(self.pool.clone())
    }
}
