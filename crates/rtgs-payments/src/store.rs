//! Settlement store trait
//!
//! The seam between the engine and persistence. The engine drives an
//! explicit transaction handle through the posting steps; implementations
//! map the handle onto a database transaction (PostgreSQL) or a staged
//! commit (memory).
//!
//! Lock acquisition is pessimistic and exclusive; callers must lock
//! accounts in ascending id order. The unique index on `msg_id` is the
//! authoritative duplicate gate: `insert_pending_transfer` surfaces the
//! violation as `PaymentError::DuplicateMessage`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use rtgs_types::{
    Account, AccountId, Currency, Iban, LedgerEntry, Transfer, TransferId, TransferStatus,
};

use crate::PaymentResult;

/// Marker bound for transaction handles
pub trait SettlementTx: Send {}

impl<T: Send> SettlementTx for T {}

/// Insert payload for a new pending transfer
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub msg_id: String,
    pub source_account_id: AccountId,
    pub destination_account_id: AccountId,
    pub amount: Decimal,
    pub currency: Currency,
}

/// Persistence seam for accounts, transfers, and ledger entries
#[async_trait]
pub trait SettlementStore: Send + Sync + 'static {
    type Tx: SettlementTx;

    // ------------------------------------------------------------------
    // Transaction control
    // ------------------------------------------------------------------

    async fn begin(&self) -> PaymentResult<Self::Tx>;
    async fn commit(&self, tx: Self::Tx) -> PaymentResult<()>;
    async fn rollback(&self, tx: Self::Tx) -> PaymentResult<()>;

    // ------------------------------------------------------------------
    // Reads outside any posting transaction
    // ------------------------------------------------------------------

    async fn account_by_iban(&self, iban: &Iban) -> PaymentResult<Option<Account>>;
    async fn account_by_id(&self, id: AccountId) -> PaymentResult<Option<Account>>;
    async fn transfer_by_msg_id(&self, msg_id: &str) -> PaymentResult<Option<Transfer>>;
    async fn transfer_by_id(&self, id: TransferId) -> PaymentResult<Option<Transfer>>;
    async fn entries_for_transfer(&self, id: TransferId) -> PaymentResult<Vec<LedgerEntry>>;

    /// Transfers currently held for manual review
    async fn blocked_transfers(&self) -> PaymentResult<Vec<Transfer>>;

    /// Open a new account. IBAN uniqueness is index-enforced.
    async fn create_account(
        &self,
        iban: Iban,
        holder_name: String,
        currency: Currency,
        opening_balance: Decimal,
    ) -> PaymentResult<Account>;

    /// Guarded state transition in its own transactional scope.
    ///
    /// Fails with `InvalidTransfer` when the transfer is not in `expected`,
    /// which is how replayed reviews and double transitions surface.
    async fn transition_status(
        &self,
        id: TransferId,
        expected: TransferStatus,
        next: TransferStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> PaymentResult<Transfer>;

    // ------------------------------------------------------------------
    // Operations inside a posting transaction
    // ------------------------------------------------------------------

    /// Insert a PENDING transfer; `DuplicateMessage` on msg_id collision
    async fn insert_pending_transfer(
        &self,
        tx: &mut Self::Tx,
        new: NewTransfer,
    ) -> PaymentResult<Transfer>;

    /// Re-read a transfer under an exclusive row lock
    async fn lock_transfer(
        &self,
        tx: &mut Self::Tx,
        id: TransferId,
    ) -> PaymentResult<Transfer>;

    /// Acquire the exclusive account lock and return the locked row.
    /// Surfaces `Conflict(LockTimeout)` when the lock cannot be had in time.
    async fn lock_account(&self, tx: &mut Self::Tx, id: AccountId) -> PaymentResult<Account>;

    /// Insert the matched debit/credit pair
    async fn insert_entries(
        &self,
        tx: &mut Self::Tx,
        debit: LedgerEntry,
        credit: LedgerEntry,
    ) -> PaymentResult<()>;

    /// Signed entry sum for a transfer as visible inside this transaction.
    /// Zero means the double-entry invariant holds.
    async fn entry_sum(&self, tx: &mut Self::Tx, transfer_id: TransferId)
        -> PaymentResult<Decimal>;

    /// Set a locked account's balance
    async fn update_balance(
        &self,
        tx: &mut Self::Tx,
        account_id: AccountId,
        new_balance: Decimal,
    ) -> PaymentResult<()>;

    /// Transition a transfer to a terminal state inside this transaction
    async fn finalize_transfer(
        &self,
        tx: &mut Self::Tx,
        transfer_id: TransferId,
        status: TransferStatus,
        completed_at: DateTime<Utc>,
    ) -> PaymentResult<Transfer>;
}
