//! PostgreSQL settlement store
//!
//! Maps the engine's transaction handle onto a database transaction.
//! Account locks are `SELECT ... FOR UPDATE`; the session `lock_timeout`
//! turns contention into retryable 55P03 errors. The unique index on
//! `transfers.msg_id` is the duplicate gate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use rtgs_payments::{
    NewTransfer, PaymentError, PaymentResult, SettlementStore,
};
use rtgs_types::{
    Account, AccountId, Currency, Iban, LedgerEntry, Transfer, TransferId, TransferStatus,
};

use crate::error::{is_unique_violation, payment_error};
use crate::models::{DbAccount, DbLedgerEntry, DbTransfer};

const ACCOUNT_COLUMNS: &str = "id, iban, holder_name, currency, balance, created_at";
const TRANSFER_COLUMNS: &str = "id, msg_id, source_account_id, destination_account_id, amount, currency, status, created_at, completed_at";
const ENTRY_COLUMNS: &str = "id, transfer_id, account_id, entry_type, amount, created_at";

/// Settlement store over a PostgreSQL pool
#[derive(Clone)]
pub struct PgSettlementStore {
    pool: PgPool,
}

impl PgSettlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn domain_account(row: DbAccount) -> PaymentResult<Account> {
        Account::try_from(row).map_err(|e| PaymentError::Store(e.to_string()))
    }

    fn domain_transfer(row: DbTransfer) -> PaymentResult<Transfer> {
        Transfer::try_from(row).map_err(|e| PaymentError::Store(e.to_string()))
    }
}

#[async_trait]
impl SettlementStore for PgSettlementStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> PaymentResult<Self::Tx> {
        self.pool.begin().await.map_err(payment_error)
    }

    async fn commit(&self, tx: Self::Tx) -> PaymentResult<()> {
        tx.commit().await.map_err(payment_error)
    }

    async fn rollback(&self, tx: Self::Tx) -> PaymentResult<()> {
        tx.rollback().await.map_err(payment_error)
    }

    async fn account_by_iban(&self, iban: &Iban) -> PaymentResult<Option<Account>> {
        let row = sqlx::query_as::<_, DbAccount>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE iban = $1"
        ))
        .bind(iban.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(payment_error)?;
        row.map(Self::domain_account).transpose()
    }

    async fn account_by_id(&self, id: AccountId) -> PaymentResult<Option<Account>> {
        let row = sqlx::query_as::<_, DbAccount>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(payment_error)?;
        row.map(Self::domain_account).transpose()
    }

    async fn transfer_by_msg_id(&self, msg_id: &str) -> PaymentResult<Option<Transfer>> {
        let row = sqlx::query_as::<_, DbTransfer>(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE msg_id = $1"
        ))
        .bind(msg_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(payment_error)?;
        row.map(Self::domain_transfer).transpose()
    }

    async fn transfer_by_id(&self, id: TransferId) -> PaymentResult<Option<Transfer>> {
        let row = sqlx::query_as::<_, DbTransfer>(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(payment_error)?;
        row.map(Self::domain_transfer).transpose()
    }

    async fn entries_for_transfer(&self, id: TransferId) -> PaymentResult<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, DbLedgerEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE transfer_id = $1 ORDER BY created_at"
        ))
        .bind(id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(payment_error)?;
        rows.into_iter()
            .map(|row| {
                LedgerEntry::try_from(row).map_err(|e| PaymentError::Store(e.to_string()))
            })
            .collect()
    }

    async fn blocked_transfers(&self) -> PaymentResult<Vec<Transfer>> {
        let rows = sqlx::query_as::<_, DbTransfer>(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE status = 'BLOCKED_AML' ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(payment_error)?;
        rows.into_iter().map(Self::domain_transfer).collect()
    }

    async fn create_account(
        &self,
        iban: Iban,
        holder_name: String,
        currency: Currency,
        opening_balance: Decimal,
    ) -> PaymentResult<Account> {
        let row = sqlx::query_as::<_, DbAccount>(&format!(
            r#"
            INSERT INTO accounts (iban, holder_name, currency, balance)
            VALUES ($1, $2, $3, $4)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(iban.as_str())
        .bind(&holder_name)
        .bind(currency.as_str())
        .bind(opening_balance)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "accounts_iban") {
                PaymentError::Store(format!("account already exists for IBAN {}", iban))
            } else {
                payment_error(e)
            }
        })?;
        Self::domain_account(row)
    }

    async fn transition_status(
        &self,
        id: TransferId,
        expected: TransferStatus,
        next: TransferStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> PaymentResult<Transfer> {
        let row = sqlx::query_as::<_, DbTransfer>(&format!(
            r#"
            UPDATE transfers
            SET status = $3, completed_at = $4
            WHERE id = $1 AND status = $2
            RETURNING {TRANSFER_COLUMNS}
            "#
        ))
        .bind(id.0)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(completed_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(payment_error)?;

        match row {
            Some(row) => Self::domain_transfer(row),
            None => {
                // Guard failed: report the state the row is actually in.
                match self.transfer_by_id(id).await? {
                    Some(current) => Err(PaymentError::InvalidTransfer {
                        reason: format!(
                            "transfer {} is {}, expected {}",
                            id, current.status, expected
                        ),
                    }),
                    None => Err(PaymentError::TransferNotFound {
                        transfer_id: id.to_string(),
                    }),
                }
            }
        }
    }

    async fn insert_pending_transfer(
        &self,
        tx: &mut Self::Tx,
        new: NewTransfer,
    ) -> PaymentResult<Transfer> {
        let row = sqlx::query_as::<_, DbTransfer>(&format!(
            r#"
            INSERT INTO transfers
                (msg_id, source_account_id, destination_account_id, amount, currency, status)
            VALUES ($1, $2, $3, $4, $5, 'PENDING')
            RETURNING {TRANSFER_COLUMNS}
            "#
        ))
        .bind(&new.msg_id)
        .bind(new.source_account_id.0)
        .bind(new.destination_account_id.0)
        .bind(new.amount)
        .bind(new.currency.as_str())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "transfers_msg_id") {
                PaymentError::DuplicateMessage {
                    msg_id: new.msg_id.clone(),
                }
            } else {
                payment_error(e)
            }
        })?;
        Self::domain_transfer(row)
    }

    async fn lock_transfer(&self, tx: &mut Self::Tx, id: TransferId) -> PaymentResult<Transfer> {
        let row = sqlx::query_as::<_, DbTransfer>(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(payment_error)?
        .ok_or_else(|| PaymentError::TransferNotFound {
            transfer_id: id.to_string(),
        })?;
        Self::domain_transfer(row)
    }

    async fn lock_account(&self, tx: &mut Self::Tx, id: AccountId) -> PaymentResult<Account> {
        let row = sqlx::query_as::<_, DbAccount>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.0)
        .fetch_optional(&mut **tx)
        .await
        .map_err(payment_error)?
        .ok_or_else(|| PaymentError::Store(format!("account {} missing", id)))?;
        Self::domain_account(row)
    }

    async fn insert_entries(
        &self,
        tx: &mut Self::Tx,
        debit: LedgerEntry,
        credit: LedgerEntry,
    ) -> PaymentResult<()> {
        for entry in [debit, credit] {
            sqlx::query(
                r#"
                INSERT INTO ledger_entries (id, transfer_id, account_id, entry_type, amount)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(entry.id.0)
            .bind(entry.transfer_id.0)
            .bind(entry.account_id.0)
            .bind(entry.entry_type.as_str())
            .bind(entry.amount)
            .execute(&mut **tx)
            .await
            .map_err(payment_error)?;
        }
        Ok(())
    }

    async fn entry_sum(
        &self,
        tx: &mut Self::Tx,
        transfer_id: TransferId,
    ) -> PaymentResult<Decimal> {
        let sum: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(CASE WHEN entry_type = 'CREDIT' THEN amount ELSE -amount END), 0)
            FROM ledger_entries
            WHERE transfer_id = $1
            "#,
        )
        .bind(transfer_id.0)
        .fetch_one(&mut **tx)
        .await
        .map_err(payment_error)?;
        Ok(sum)
    }

    async fn update_balance(
        &self,
        tx: &mut Self::Tx,
        account_id: AccountId,
        new_balance: Decimal,
    ) -> PaymentResult<()> {
        sqlx::query("UPDATE accounts SET balance = $2 WHERE id = $1")
            .bind(account_id.0)
            .bind(new_balance)
            .execute(&mut **tx)
            .await
            .map_err(payment_error)?;
        Ok(())
    }

    async fn finalize_transfer(
        &self,
        tx: &mut Self::Tx,
        transfer_id: TransferId,
        status: TransferStatus,
        completed_at: DateTime<Utc>,
    ) -> PaymentResult<Transfer> {
        let row = sqlx::query_as::<_, DbTransfer>(&format!(
            r#"
            UPDATE transfers
            SET status = $2, completed_at = $3
            WHERE id = $1
            RETURNING {TRANSFER_COLUMNS}
            "#
        ))
        .bind(transfer_id.0)
        .bind(status.as_str())
        .bind(completed_at)
        .fetch_optional(&mut **tx)
        .await
        .map_err(payment_error)?
        .ok_or_else(|| PaymentError::TransferNotFound {
            transfer_id: transfer_id.to_string(),
        })?;
        Self::domain_transfer(row)
    }
}
