//! Row types
//!
//! Raw rows as fetched by `query_as`, with fallible conversions into the
//! domain types. Statuses and sources are TEXT columns; a row that fails to
//! parse indicates out-of-band mutation and surfaces as `InvalidRow`.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use rtgs_types::{
    Account, AccountId, Currency, EntryId, EntryType, Iban, LedgerEntry, SanctionEntry,
    SanctionId, SanctionSource, Transfer, TransferId, TransferStatus,
};

use crate::{DbError, DbResult};

#[derive(Debug, Clone, FromRow)]
pub struct DbAccount {
    pub id: Uuid,
    pub iban: String,
    pub holder_name: String,
    pub currency: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbAccount> for Account {
    type Error = DbError;

    fn try_from(row: DbAccount) -> DbResult<Self> {
        Ok(Account {
            id: AccountId::from(row.id),
            iban: Iban::new(row.iban.trim())
                .map_err(|e| DbError::InvalidRow(e.to_string()))?,
            holder_name: row.holder_name,
            currency: Currency::new(row.currency.trim())
                .map_err(|e| DbError::InvalidRow(e.to_string()))?,
            balance: row.balance,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbTransfer {
    pub id: Uuid,
    pub msg_id: String,
    pub source_account_id: Uuid,
    pub destination_account_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbTransfer> for Transfer {
    type Error = DbError;

    fn try_from(row: DbTransfer) -> DbResult<Self> {
        Ok(Transfer {
            id: TransferId::from(row.id),
            msg_id: row.msg_id,
            source_account_id: AccountId::from(row.source_account_id),
            destination_account_id: AccountId::from(row.destination_account_id),
            amount: row.amount,
            currency: Currency::new(row.currency.trim())
                .map_err(|e| DbError::InvalidRow(e.to_string()))?,
            status: TransferStatus::from_str(&row.status).map_err(DbError::InvalidRow)?,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbLedgerEntry {
    pub id: Uuid,
    pub transfer_id: Uuid,
    pub account_id: Uuid,
    pub entry_type: String,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbLedgerEntry> for LedgerEntry {
    type Error = DbError;

    fn try_from(row: DbLedgerEntry) -> DbResult<Self> {
        Ok(LedgerEntry {
            id: EntryId::from(row.id),
            transfer_id: TransferId::from(row.transfer_id),
            account_id: AccountId::from(row.account_id),
            entry_type: EntryType::from_str(&row.entry_type).map_err(DbError::InvalidRow)?,
            amount: row.amount,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbSanction {
    pub id: Uuid,
    pub name: String,
    pub normalized_name: String,
    pub source: String,
    pub risk_score: i16,
    pub listed_at: DateTime<Utc>,
}

impl TryFrom<DbSanction> for SanctionEntry {
    type Error = DbError;

    fn try_from(row: DbSanction) -> DbResult<Self> {
        Ok(SanctionEntry {
            id: SanctionId::from(row.id),
            name: row.name,
            normalized_name: row.normalized_name,
            source: SanctionSource::from_str(&row.source).map_err(DbError::InvalidRow)?,
            risk_score: u8::try_from(row.risk_score)
                .map_err(|_| DbError::InvalidRow(format!("risk_score {}", row.risk_score)))?,
            listed_at: row.listed_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbAuditRecord {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub payload: String,
    pub prev_hash: String,
    pub curr_hash: String,
    pub created_at: DateTime<Utc>,
}

impl From<DbAuditRecord> for rtgs_audit::AuditRecord {
    fn from(row: DbAuditRecord) -> Self {
        Self {
            id: row.id,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            action: row.action,
            payload: row.payload,
            prev_hash: row.prev_hash.trim().to_string(),
            curr_hash: row.curr_hash.trim().to_string(),
            created_at: row.created_at,
        }
    }
}
