//! In-memory settlement store
//!
//! Backs unit and scenario tests with the same observable semantics as the
//! PostgreSQL store: per-account exclusive locks with a timeout, msg_id
//! uniqueness enforced at insert, staged writes that become visible only at
//! commit, and a compare-and-set on transfer status at commit so a transfer
//! finalized by a racing transaction surfaces as a serialization conflict.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex as PlMutex, RwLock};
use rust_decimal::Decimal;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use rtgs_types::{
    Account, AccountId, Currency, Iban, LedgerEntry, Transfer, TransferId, TransferStatus,
};

use crate::error::ConflictKind;
use crate::{NewTransfer, PaymentError, PaymentResult, SettlementStore};

struct StatusChange {
    transfer_id: TransferId,
    expected: TransferStatus,
    next: TransferStatus,
    completed_at: Option<DateTime<Utc>>,
}

struct Inner {
    accounts: RwLock<HashMap<AccountId, Account>>,
    iban_index: RwLock<HashMap<Iban, AccountId>>,
    /// One async mutex per account; holding it is the exclusive row lock
    account_locks: RwLock<HashMap<AccountId, Arc<AsyncMutex<()>>>>,
    transfers: RwLock<HashMap<TransferId, Transfer>>,
    msg_index: RwLock<HashMap<String, TransferId>>,
    /// msg_ids claimed by in-flight transactions
    reservations: PlMutex<HashSet<String>>,
    entries: RwLock<Vec<LedgerEntry>>,
    lock_timeout: Duration,
}

/// Staged transaction over the memory store
pub struct MemoryTx {
    inner: Arc<Inner>,
    staged_inserts: Vec<Transfer>,
    status_changes: Vec<StatusChange>,
    staged_entries: Vec<LedgerEntry>,
    staged_balances: HashMap<AccountId, Decimal>,
    reserved: Vec<String>,
    /// Status observed when a pre-existing transfer was locked; the commit
    /// compare-and-set validates against it
    observed_status: HashMap<TransferId, TransferStatus>,
    guards: HashMap<AccountId, OwnedMutexGuard<()>>,
    finished: bool,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if !self.finished {
            let mut reservations = self.inner.reservations.lock();
            for msg_id in &self.reserved {
                reservations.remove(msg_id);
            }
        }
        // Account guards release on drop.
    }
}

/// Map-backed settlement store
#[derive(Clone)]
pub struct MemorySettlementStore {
    inner: Arc<Inner>,
}

impl Default for MemorySettlementStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySettlementStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(Duration::from_secs(30))
    }

    /// Shorter timeouts keep conflict tests fast
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                accounts: RwLock::new(HashMap::new()),
                iban_index: RwLock::new(HashMap::new()),
                account_locks: RwLock::new(HashMap::new()),
                transfers: RwLock::new(HashMap::new()),
                msg_index: RwLock::new(HashMap::new()),
                reservations: PlMutex::new(HashSet::new()),
                entries: RwLock::new(Vec::new()),
                lock_timeout,
            }),
        }
    }

    pub fn all_entries(&self) -> Vec<LedgerEntry> {
        self.inner.entries.read().clone()
    }

    pub fn transfer_count(&self) -> usize {
        self.inner.transfers.read().len()
    }

    fn account_lock_cell(&self, id: AccountId) -> Option<Arc<AsyncMutex<()>>> {
        self.inner.account_locks.read().get(&id).cloned()
    }
}

#[async_trait]
impl SettlementStore for MemorySettlementStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> PaymentResult<MemoryTx> {
        Ok(MemoryTx {
            inner: self.inner.clone(),
            staged_inserts: Vec::new(),
            status_changes: Vec::new(),
            staged_entries: Vec::new(),
            staged_balances: HashMap::new(),
            reserved: Vec::new(),
            observed_status: HashMap::new(),
            guards: HashMap::new(),
            finished: false,
        })
    }

    async fn commit(&self, mut tx: MemoryTx) -> PaymentResult<()> {
        {
            let mut transfers = self.inner.transfers.write();
            let mut msg_index = self.inner.msg_index.write();

            // Compare-and-set under the write lock: a transfer finalized by
            // a racing writer since we observed it makes this commit a
            // serialization victim.
            for change in &tx.status_changes {
                let current = transfers.get(&change.transfer_id).ok_or_else(|| {
                    PaymentError::TransferNotFound {
                        transfer_id: change.transfer_id.to_string(),
                    }
                })?;
                if current.status != change.expected {
                    return Err(PaymentError::Conflict(ConflictKind::SerializationFailure));
                }
            }

            for transfer in tx.staged_inserts.drain(..) {
                msg_index.insert(transfer.msg_id.clone(), transfer.id);
                transfers.insert(transfer.id, transfer);
            }
            for change in tx.status_changes.drain(..) {
                if let Some(transfer) = transfers.get_mut(&change.transfer_id) {
                    transfer.status = change.next;
                    transfer.completed_at = change.completed_at;
                }
            }
        }

        self.inner.entries.write().append(&mut tx.staged_entries);

        {
            let mut accounts = self.inner.accounts.write();
            for (id, balance) in tx.staged_balances.drain() {
                if let Some(account) = accounts.get_mut(&id) {
                    account.balance = balance;
                }
            }
        }

        {
            let mut reservations = self.inner.reservations.lock();
            for msg_id in &tx.reserved {
                reservations.remove(msg_id);
            }
        }

        tx.finished = true;
        Ok(())
    }

    async fn rollback(&self, tx: MemoryTx) -> PaymentResult<()> {
        // Drop releases reservations and guards.
        drop(tx);
        Ok(())
    }

    async fn account_by_iban(&self, iban: &Iban) -> PaymentResult<Option<Account>> {
        let id = match self.inner.iban_index.read().get(iban) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.inner.accounts.read().get(&id).cloned())
    }

    async fn account_by_id(&self, id: AccountId) -> PaymentResult<Option<Account>> {
        Ok(self.inner.accounts.read().get(&id).cloned())
    }

    async fn transfer_by_msg_id(&self, msg_id: &str) -> PaymentResult<Option<Transfer>> {
        let id = match self.inner.msg_index.read().get(msg_id) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.inner.transfers.read().get(&id).cloned())
    }

    async fn transfer_by_id(&self, id: TransferId) -> PaymentResult<Option<Transfer>> {
        Ok(self.inner.transfers.read().get(&id).cloned())
    }

    async fn entries_for_transfer(&self, id: TransferId) -> PaymentResult<Vec<LedgerEntry>> {
        Ok(self
            .inner
            .entries
            .read()
            .iter()
            .filter(|e| e.transfer_id == id)
            .cloned()
            .collect())
    }

    async fn blocked_transfers(&self) -> PaymentResult<Vec<Transfer>> {
        let mut blocked: Vec<Transfer> = self
            .inner
            .transfers
            .read()
            .values()
            .filter(|t| t.status == TransferStatus::BlockedAml)
            .cloned()
            .collect();
        blocked.sort_by_key(|t| t.created_at);
        Ok(blocked)
    }

    async fn create_account(
        &self,
        iban: Iban,
        holder_name: String,
        currency: Currency,
        opening_balance: Decimal,
    ) -> PaymentResult<Account> {
        let mut iban_index = self.inner.iban_index.write();
        if iban_index.contains_key(&iban) {
            return Err(PaymentError::Store(format!(
                "account already exists for IBAN {}",
                iban
            )));
        }
        let account = Account {
            id: AccountId::new(),
            iban: iban.clone(),
            holder_name,
            currency,
            balance: opening_balance,
            created_at: Utc::now(),
        };
        iban_index.insert(iban, account.id);
        self.inner
            .account_locks
            .write()
            .insert(account.id, Arc::new(AsyncMutex::new(())));
        self.inner.accounts.write().insert(account.id, account.clone());
        Ok(account)
    }

    async fn transition_status(
        &self,
        id: TransferId,
        expected: TransferStatus,
        next: TransferStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> PaymentResult<Transfer> {
        let mut transfers = self.inner.transfers.write();
        let transfer = transfers
            .get_mut(&id)
            .ok_or_else(|| PaymentError::TransferNotFound {
                transfer_id: id.to_string(),
            })?;
        if transfer.status != expected {
            return Err(PaymentError::InvalidTransfer {
                reason: format!(
                    "transfer {} is {}, expected {}",
                    id, transfer.status, expected
                ),
            });
        }
        transfer.status = next;
        transfer.completed_at = completed_at;
        Ok(transfer.clone())
    }

    async fn insert_pending_transfer(
        &self,
        tx: &mut MemoryTx,
        new: NewTransfer,
    ) -> PaymentResult<Transfer> {
        {
            let committed = self.inner.msg_index.read().contains_key(&new.msg_id);
            let mut reservations = self.inner.reservations.lock();
            if committed || reservations.contains(&new.msg_id) {
                return Err(PaymentError::DuplicateMessage {
                    msg_id: new.msg_id.clone(),
                });
            }
            reservations.insert(new.msg_id.clone());
        }
        tx.reserved.push(new.msg_id.clone());

        let transfer = Transfer {
            id: TransferId::new(),
            msg_id: new.msg_id,
            source_account_id: new.source_account_id,
            destination_account_id: new.destination_account_id,
            amount: new.amount,
            currency: new.currency,
            status: TransferStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        };
        tx.staged_inserts.push(transfer.clone());
        Ok(transfer)
    }

    async fn lock_transfer(&self, tx: &mut MemoryTx, id: TransferId) -> PaymentResult<Transfer> {
        let transfer = self
            .inner
            .transfers
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| PaymentError::TransferNotFound {
                transfer_id: id.to_string(),
            })?;
        tx.observed_status.insert(id, transfer.status);
        Ok(transfer)
    }

    async fn lock_account(&self, tx: &mut MemoryTx, id: AccountId) -> PaymentResult<Account> {
        if !tx.guards.contains_key(&id) {
            let cell = self
                .account_lock_cell(id)
                .ok_or_else(|| PaymentError::Store(format!("no lock cell for account {}", id)))?;
            let guard = tokio::time::timeout(self.inner.lock_timeout, cell.lock_owned())
                .await
                .map_err(|_| PaymentError::Conflict(ConflictKind::LockTimeout))?;
            tx.guards.insert(id, guard);
        }
        self.inner
            .accounts
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| PaymentError::Store(format!("account {} missing", id)))
    }

    async fn insert_entries(
        &self,
        tx: &mut MemoryTx,
        debit: LedgerEntry,
        credit: LedgerEntry,
    ) -> PaymentResult<()> {
        tx.staged_entries.push(debit);
        tx.staged_entries.push(credit);
        Ok(())
    }

    async fn entry_sum(
        &self,
        tx: &mut MemoryTx,
        transfer_id: TransferId,
    ) -> PaymentResult<Decimal> {
        let committed: Decimal = self
            .inner
            .entries
            .read()
            .iter()
            .filter(|e| e.transfer_id == transfer_id)
            .map(LedgerEntry::signed_amount)
            .sum();
        let staged: Decimal = tx
            .staged_entries
            .iter()
            .filter(|e| e.transfer_id == transfer_id)
            .map(LedgerEntry::signed_amount)
            .sum();
        Ok(committed + staged)
    }

    async fn update_balance(
        &self,
        tx: &mut MemoryTx,
        account_id: AccountId,
        new_balance: Decimal,
    ) -> PaymentResult<()> {
        if !tx.guards.contains_key(&account_id) {
            return Err(PaymentError::Store(format!(
                "balance update without lock on account {}",
                account_id
            )));
        }
        tx.staged_balances.insert(account_id, new_balance);
        Ok(())
    }

    async fn finalize_transfer(
        &self,
        tx: &mut MemoryTx,
        transfer_id: TransferId,
        status: TransferStatus,
        completed_at: DateTime<Utc>,
    ) -> PaymentResult<Transfer> {
        // A transfer inserted by this same transaction is mutated in place.
        if let Some(staged) = tx.staged_inserts.iter_mut().find(|t| t.id == transfer_id) {
            staged.status = status;
            staged.completed_at = Some(completed_at);
            return Ok(staged.clone());
        }

        let expected = match tx.observed_status.get(&transfer_id) {
            Some(status) => *status,
            None => {
                self.inner
                    .transfers
                    .read()
                    .get(&transfer_id)
                    .map(|t| t.status)
                    .ok_or_else(|| PaymentError::TransferNotFound {
                        transfer_id: transfer_id.to_string(),
                    })?
            }
        };

        let mut transfer = self
            .inner
            .transfers
            .read()
            .get(&transfer_id)
            .cloned()
            .ok_or_else(|| PaymentError::TransferNotFound {
                transfer_id: transfer_id.to_string(),
            })?;

        tx.status_changes.push(StatusChange {
            transfer_id,
            expected,
            next: status,
            completed_at: Some(completed_at),
        });

        transfer.status = status;
        transfer.completed_at = Some(completed_at);
        Ok(transfer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn iban(s: &str) -> Iban {
        Iban::new(s).unwrap()
    }

    async fn store_with_account(balance: Decimal) -> (MemorySettlementStore, Account) {
        let store = MemorySettlementStore::new();
        let account = store
            .create_account(
                iban("DE89370400440532013000"),
                "Alice".to_string(),
                Currency::eur(),
                balance,
            )
            .await
            .unwrap();
        (store, account)
    }

    #[tokio::test]
    async fn test_create_account_enforces_iban_uniqueness() {
        let (store, _) = store_with_account(dec!(100)).await;
        let duplicate = store
            .create_account(
                iban("DE89370400440532013000"),
                "Mallory".to_string(),
                Currency::eur(),
                dec!(0),
            )
            .await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn test_staged_writes_invisible_until_commit() {
        let (store, account) = store_with_account(dec!(100)).await;
        let mut tx = store.begin().await.unwrap();
        store
            .insert_pending_transfer(
                &mut tx,
                NewTransfer {
                    msg_id: "m-1".to_string(),
                    source_account_id: account.id,
                    destination_account_id: account.id,
                    amount: dec!(10),
                    currency: Currency::eur(),
                },
            )
            .await
            .unwrap();

        assert!(store.transfer_by_msg_id("m-1").await.unwrap().is_none());
        store.commit(tx).await.unwrap();
        assert!(store.transfer_by_msg_id("m-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_msg_id_rejected_across_inflight_tx() {
        let (store, account) = store_with_account(dec!(100)).await;
        let new = |msg: &str| NewTransfer {
            msg_id: msg.to_string(),
            source_account_id: account.id,
            destination_account_id: account.id,
            amount: dec!(10),
            currency: Currency::eur(),
        };

        let mut tx1 = store.begin().await.unwrap();
        store.insert_pending_transfer(&mut tx1, new("m-1")).await.unwrap();

        let mut tx2 = store.begin().await.unwrap();
        let second = store.insert_pending_transfer(&mut tx2, new("m-1")).await;
        assert!(matches!(second, Err(PaymentError::DuplicateMessage { .. })));

        // Rolling back the first releases the reservation.
        store.rollback(tx1).await.unwrap();
        let mut tx3 = store.begin().await.unwrap();
        assert!(store.insert_pending_transfer(&mut tx3, new("m-1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_lock_account_times_out_when_held() {
        let store = MemorySettlementStore::with_lock_timeout(Duration::from_millis(50));
        let account = store
            .create_account(
                iban("DE89370400440532013000"),
                "Alice".to_string(),
                Currency::eur(),
                dec!(100),
            )
            .await
            .unwrap();

        let mut tx1 = store.begin().await.unwrap();
        store.lock_account(&mut tx1, account.id).await.unwrap();

        let mut tx2 = store.begin().await.unwrap();
        let blocked = store.lock_account(&mut tx2, account.id).await;
        assert!(matches!(
            blocked,
            Err(PaymentError::Conflict(ConflictKind::LockTimeout))
        ));
    }

    #[tokio::test]
    async fn test_transition_status_guards_expected_state() {
        let (store, account) = store_with_account(dec!(100)).await;
        let mut tx = store.begin().await.unwrap();
        let transfer = store
            .insert_pending_transfer(
                &mut tx,
                NewTransfer {
                    msg_id: "m-1".to_string(),
                    source_account_id: account.id,
                    destination_account_id: account.id,
                    amount: dec!(10),
                    currency: Currency::eur(),
                },
            )
            .await
            .unwrap();
        store.commit(tx).await.unwrap();

        let blocked = store
            .transition_status(
                transfer.id,
                TransferStatus::Pending,
                TransferStatus::BlockedAml,
                None,
            )
            .await
            .unwrap();
        assert_eq!(blocked.status, TransferStatus::BlockedAml);

        // Replaying the same transition fails: the state moved on.
        let replay = store
            .transition_status(
                transfer.id,
                TransferStatus::Pending,
                TransferStatus::BlockedAml,
                None,
            )
            .await;
        assert!(matches!(replay, Err(PaymentError::InvalidTransfer { .. })));
    }

    #[tokio::test]
    async fn test_commit_cas_detects_racing_finalize() {
        let (store, account) = store_with_account(dec!(100)).await;
        let mut setup = store.begin().await.unwrap();
        let transfer = store
            .insert_pending_transfer(
                &mut setup,
                NewTransfer {
                    msg_id: "m-1".to_string(),
                    source_account_id: account.id,
                    destination_account_id: account.id,
                    amount: dec!(10),
                    currency: Currency::eur(),
                },
            )
            .await
            .unwrap();
        store.commit(setup).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        store.lock_transfer(&mut tx, transfer.id).await.unwrap();

        // Another writer finalizes first.
        store
            .transition_status(
                transfer.id,
                TransferStatus::Pending,
                TransferStatus::Rejected,
                Some(Utc::now()),
            )
            .await
            .unwrap();

        store
            .finalize_transfer(&mut tx, transfer.id, TransferStatus::Cleared, Utc::now())
            .await
            .unwrap();
        let conflict = store.commit(tx).await;
        assert!(matches!(
            conflict,
            Err(PaymentError::Conflict(ConflictKind::SerializationFailure))
        ));
    }
}
