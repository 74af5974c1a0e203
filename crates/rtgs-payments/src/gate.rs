//! Idempotency gate
//!
//! A cheap read-side check on `msg_id`. The read alone cannot exclude a
//! concurrent insert; the authoritative gate is the unique index consulted
//! by the engine's pending-transfer insert, which resolves the race into a
//! duplicate acknowledgement.

use std::sync::Arc;

use rtgs_types::Transfer;

use crate::{PaymentResult, SettlementStore};

/// Outcome of the read-side duplicate check
#[derive(Debug, Clone)]
pub enum IdempotencyVerdict {
    /// No transfer exists for this msg_id
    New,
    /// Already answered; carries the existing transfer
    Duplicate(Transfer),
}

/// Read-side duplicate detection over the settlement store
pub struct IdempotencyGate<S: SettlementStore> {
    store: Arc<S>,
}

impl<S: SettlementStore> IdempotencyGate<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn check(&self, msg_id: &str) -> PaymentResult<IdempotencyVerdict> {
        Ok(match self.store.transfer_by_msg_id(msg_id).await? {
            Some(existing) => IdempotencyVerdict::Duplicate(existing),
            None => IdempotencyVerdict::New,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemorySettlementStore, NewTransfer};
    use rtgs_types::{Currency, Iban};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_gate_verdicts() {
        let store = Arc::new(MemorySettlementStore::new());
        let account = store
            .create_account(
                Iban::new("DE89370400440532013000").unwrap(),
                "Alice".to_string(),
                Currency::eur(),
                dec!(100),
            )
            .await
            .unwrap();

        let gate = IdempotencyGate::new(store.clone());
        assert!(matches!(
            gate.check("m-1").await.unwrap(),
            IdempotencyVerdict::New
        ));

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
        store.commit(tx).await.unwrap();

        match gate.check("m-1").await.unwrap() {
            IdempotencyVerdict::Duplicate(existing) => assert_eq!(existing.msg_id, "m-1"),
            IdempotencyVerdict::New => panic!("expected duplicate"),
        }
    }
}
