//! Payment engine
//!
//! `post` is the end-to-end path used by the ingestion pipeline;
//! `post_prepared` finishes a transfer that is already PENDING (the
//! manual-approval path). Both settle all-or-nothing in one store
//! transaction with pessimistic account locks taken in ascending id order,
//! which removes the classic two-account deadlock.
//!
//! Event publication happens strictly after commit. An observer can see a
//! transfer event only once a store read would also return the transfer.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{error, info, warn};

use rtgs_audit::AuditLog;
use rtgs_types::{
    Account, EntryId, EntryType, LedgerEntry, Transfer, TransferEvent, TransferId,
    TransferInstruction, TransferStatus,
};

use crate::error::ConflictKind;
use crate::{NewTransfer, PaymentConfig, PaymentError, PaymentResult, SettlementStore};

/// Invoked after the posting transaction commits.
///
/// Implementations must swallow their own failures (log, dead-letter);
/// nothing downstream of a commit may unwind it.
#[async_trait]
pub trait PostCommitHook: Send + Sync {
    async fn transfer_committed(&self, event: TransferEvent);
}

/// Hook that publishes nowhere
#[derive(Debug, Default, Clone)]
pub struct NoopHook;

#[async_trait]
impl PostCommitHook for NoopHook {
    async fn transfer_committed(&self, _event: TransferEvent) {}
}

/// Result of staging an instruction as a PENDING transfer
#[derive(Debug, Clone)]
pub enum PrepareOutcome {
    /// Newly created, ready for screening
    Created(Transfer),
    /// Already answered by an earlier message with the same msg_id
    Duplicate(Transfer),
}

/// How a post request was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    /// Settled by this call
    Posted,
    /// Already answered by an earlier message with the same msg_id
    Duplicate,
}

/// Result of a posting call
#[derive(Debug, Clone)]
pub struct PostResponse {
    pub outcome: PostOutcome,
    pub transfer: Transfer,
}

/// Transactional double-entry posting engine
pub struct PaymentEngine<S: SettlementStore> {
    store: Arc<S>,
    audit: AuditLog,
    hook: Arc<dyn PostCommitHook>,
    config: PaymentConfig,
}

impl<S: SettlementStore> PaymentEngine<S> {
    pub fn new(
        store: Arc<S>,
        audit: AuditLog,
        hook: Arc<dyn PostCommitHook>,
        config: PaymentConfig,
    ) -> Self {
        Self {
            store,
            audit,
            hook,
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Post a transfer end-to-end: idempotency read, validation, pending
    /// insert, ordered locks, funds check, entries, balances, finalize.
    pub async fn post(
        &self,
        instruction: &TransferInstruction,
        actor: &str,
    ) -> PaymentResult<PostResponse> {
        // Step 1: read-side idempotency check.
        if let Some(existing) = self.store.transfer_by_msg_id(&instruction.msg_id).await? {
            return Ok(self
                .acknowledge_duplicate(existing, actor, "DUPLICATE_ATTEMPT")
                .await);
        }

        // Step 2: validation, no locks yet.
        self.validate(instruction, actor).await?;

        // Steps 3-10 with retries on conflict-class failures.
        let mut attempt = 1;
        loop {
            let result = tokio::time::timeout(
                self.config.transaction_timeout,
                self.attempt_post(instruction, actor),
            )
            .await
            .unwrap_or(Err(PaymentError::Conflict(ConflictKind::LockTimeout)));

            match result {
                Err(e) if e.is_retryable() && attempt < self.config.retry_attempts => {
                    warn!(
                        msg_id = %instruction.msg_id,
                        attempt,
                        error = %e,
                        "posting conflict; backing off"
                    );
                    tokio::time::sleep(self.config.backoff_for_attempt(attempt)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Stage an instruction as a PENDING transfer without settling it.
    ///
    /// The ingestion pipeline creates the transfer up front so compliance
    /// can hold it; a clean screen then finishes it with `post_prepared`.
    pub async fn prepare(
        &self,
        instruction: &TransferInstruction,
        actor: &str,
    ) -> PaymentResult<PrepareOutcome> {
        if let Some(existing) = self.store.transfer_by_msg_id(&instruction.msg_id).await? {
            let response = self
                .acknowledge_duplicate(existing, actor, "DUPLICATE_ATTEMPT")
                .await;
            return Ok(PrepareOutcome::Duplicate(response.transfer));
        }

        let (source, dest) = self.validate(instruction, actor).await?;

        let mut attempt = 1;
        loop {
            let mut tx = self.store.begin().await?;
            let result = self
                .store
                .insert_pending_transfer(
                    &mut tx,
                    NewTransfer {
                        msg_id: instruction.msg_id.clone(),
                        source_account_id: source.id,
                        destination_account_id: dest.id,
                        amount: instruction.amount,
                        currency: instruction.currency,
                    },
                )
                .await;

            match result {
                Ok(transfer) => {
                    self.store.commit(tx).await?;
                    self.audit
                        .append_best_effort(
                            "transfer",
                            &transfer.id.to_string(),
                            "RECEIVED",
                            &json!({
                                "actor": actor,
                                "amount": transfer.amount.normalize().to_string(),
                                "currency": transfer.currency.as_str(),
                                "destination_iban": dest.iban.as_str(),
                                "end_to_end_id": instruction.end_to_end_id,
                                "msg_id": transfer.msg_id,
                                "source_iban": source.iban.as_str(),
                            }),
                        )
                        .await;
                    return Ok(PrepareOutcome::Created(transfer));
                }
                Err(PaymentError::DuplicateMessage { .. }) => {
                    self.store.rollback(tx).await?;
                    match self.store.transfer_by_msg_id(&instruction.msg_id).await? {
                        Some(existing) => {
                            let response = self
                                .acknowledge_duplicate(existing, actor, "DUPLICATE_RACE")
                                .await;
                            return Ok(PrepareOutcome::Duplicate(response.transfer));
                        }
                        // The winner has not committed yet; wait it out.
                        None if attempt < self.config.retry_attempts => {
                            tokio::time::sleep(self.config.backoff_for_attempt(attempt)).await;
                            attempt += 1;
                        }
                        None => {
                            return Err(PaymentError::Conflict(
                                ConflictKind::SerializationFailure,
                            ))
                        }
                    }
                }
                Err(e) => {
                    self.store.rollback(tx).await?;
                    return Err(e);
                }
            }
        }
    }

    /// Finish a transfer already PENDING (manual-approval path): skips the
    /// idempotency read and pending insert, runs locks through finalize.
    pub async fn post_prepared(
        &self,
        transfer_id: TransferId,
        actor: &str,
    ) -> PaymentResult<PostResponse> {
        let transfer = self
            .store
            .transfer_by_id(transfer_id)
            .await?
            .ok_or_else(|| PaymentError::TransferNotFound {
                transfer_id: transfer_id.to_string(),
            })?;
        if transfer.status != TransferStatus::Pending {
            return Err(PaymentError::InvalidTransfer {
                reason: format!(
                    "transfer {} is {}, only PENDING transfers can be posted",
                    transfer_id, transfer.status
                ),
            });
        }

        let mut attempt = 1;
        loop {
            let result = tokio::time::timeout(
                self.config.transaction_timeout,
                self.attempt_post_prepared(transfer_id, actor),
            )
            .await
            .unwrap_or(Err(PaymentError::Conflict(ConflictKind::LockTimeout)));

            match result {
                Err(e) if e.is_retryable() && attempt < self.config.retry_attempts => {
                    warn!(
                        transfer_id = %transfer_id,
                        attempt,
                        error = %e,
                        "prepared posting conflict; backing off"
                    );
                    tokio::time::sleep(self.config.backoff_for_attempt(attempt)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Amount, account existence, and currency checks shared by `post` and
    /// `prepare`. Returns the resolved (source, destination) accounts.
    async fn validate(
        &self,
        instruction: &TransferInstruction,
        actor: &str,
    ) -> PaymentResult<(Account, Account)> {
        if instruction.amount <= Decimal::ZERO {
            return self
                .invalid(instruction, actor, "amount must be positive")
                .await;
        }
        if instruction.debtor.iban == instruction.creditor.iban {
            return self
                .invalid(instruction, actor, "debtor and creditor accounts are identical")
                .await;
        }
        let source = self
            .store
            .account_by_iban(&instruction.debtor.iban)
            .await?
            .ok_or_else(|| PaymentError::AccountNotFound {
                iban: instruction.debtor.iban.to_string(),
            })?;
        let dest = self
            .store
            .account_by_iban(&instruction.creditor.iban)
            .await?
            .ok_or_else(|| PaymentError::AccountNotFound {
                iban: instruction.creditor.iban.to_string(),
            })?;
        if source.currency != instruction.currency || dest.currency != instruction.currency {
            return self
                .invalid(instruction, actor, "currency does not match both accounts")
                .await;
        }
        Ok((source, dest))
    }

    async fn attempt_post(
        &self,
        instruction: &TransferInstruction,
        actor: &str,
    ) -> PaymentResult<PostResponse> {
        let mut tx = self.store.begin().await?;

        // Step 3: pending insert; the unique index is the real gate.
        let source = self
            .store
            .account_by_iban(&instruction.debtor.iban)
            .await?
            .ok_or_else(|| PaymentError::AccountNotFound {
                iban: instruction.debtor.iban.to_string(),
            })?;
        let dest = self
            .store
            .account_by_iban(&instruction.creditor.iban)
            .await?
            .ok_or_else(|| PaymentError::AccountNotFound {
                iban: instruction.creditor.iban.to_string(),
            })?;

        let transfer = match self
            .store
            .insert_pending_transfer(
                &mut tx,
                NewTransfer {
                    msg_id: instruction.msg_id.clone(),
                    source_account_id: source.id,
                    destination_account_id: dest.id,
                    amount: instruction.amount,
                    currency: instruction.currency,
                },
            )
            .await
        {
            Ok(transfer) => transfer,
            Err(PaymentError::DuplicateMessage { .. }) => {
                self.store.rollback(tx).await?;
                // Lost the insert race. If the winner is visible we answer
                // idempotently; otherwise surface a retryable conflict so
                // the loop re-reads after the winner commits.
                return match self.store.transfer_by_msg_id(&instruction.msg_id).await? {
                    Some(existing) => Ok(self
                        .acknowledge_duplicate(existing, actor, "DUPLICATE_RACE")
                        .await),
                    None => Err(PaymentError::Conflict(ConflictKind::SerializationFailure)),
                };
            }
            Err(e) => return Err(e),
        };

        self.settle(tx, transfer, actor).await
    }

    async fn attempt_post_prepared(
        &self,
        transfer_id: TransferId,
        actor: &str,
    ) -> PaymentResult<PostResponse> {
        let mut tx = self.store.begin().await?;

        let transfer = self.store.lock_transfer(&mut tx, transfer_id).await?;
        if transfer.status != TransferStatus::Pending {
            self.store.rollback(tx).await?;
            return Err(PaymentError::InvalidTransfer {
                reason: format!(
                    "transfer {} is {}, only PENDING transfers can be posted",
                    transfer_id, transfer.status
                ),
            });
        }

        self.settle(tx, transfer, actor).await
    }

    /// Steps 4-10: ordered locks, funds check, entries, zero-sum re-check,
    /// balances, finalize, commit, audit, post-commit publication.
    async fn settle(
        &self,
        mut tx: S::Tx,
        transfer: Transfer,
        actor: &str,
    ) -> PaymentResult<PostResponse> {
        // Step 4: canonical lock order, lower account id first.
        let (first, second) = if transfer.source_account_id <= transfer.destination_account_id {
            (transfer.source_account_id, transfer.destination_account_id)
        } else {
            (transfer.destination_account_id, transfer.source_account_id)
        };
        let first_row = self.store.lock_account(&mut tx, first).await?;
        let second_row = self.store.lock_account(&mut tx, second).await?;

        // Re-bind source/dest from the locked rows.
        let (source, dest) = if first == transfer.source_account_id {
            (first_row, second_row)
        } else {
            (second_row, first_row)
        };

        // Step 5: funds check on the locked source.
        if source.balance < transfer.amount {
            let now = Utc::now();
            let rejected = self
                .store
                .finalize_transfer(&mut tx, transfer.id, TransferStatus::Rejected, now)
                .await?;
            self.store.commit(tx).await?;
            self.audit
                .append_best_effort(
                    "transfer",
                    &rejected.id.to_string(),
                    "INSUFFICIENT_FUNDS",
                    &json!({
                        "actor": actor,
                        "available": source.balance.normalize().to_string(),
                        "currency": rejected.currency.as_str(),
                        "msg_id": rejected.msg_id,
                        "requested": rejected.amount.normalize().to_string(),
                        "source_iban": source.iban.as_str(),
                    }),
                )
                .await;
            return Err(PaymentError::InsufficientFunds {
                available: source.balance,
                requested: transfer.amount,
            });
        }

        // Step 6: matched entries, then re-check the zero-sum invariant
        // before any balance moves.
        let now = Utc::now();
        let debit = LedgerEntry {
            id: EntryId::new(),
            transfer_id: transfer.id,
            account_id: source.id,
            entry_type: EntryType::Debit,
            amount: transfer.amount,
            created_at: now,
        };
        let credit = LedgerEntry {
            id: EntryId::new(),
            transfer_id: transfer.id,
            account_id: dest.id,
            entry_type: EntryType::Credit,
            amount: transfer.amount,
            created_at: now,
        };
        self.store.insert_entries(&mut tx, debit, credit).await?;

        let sum = self.store.entry_sum(&mut tx, transfer.id).await?;
        if !sum.is_zero() {
            let _ = self.store.rollback(tx).await;
            error!(
                transfer_id = %transfer.id,
                sum = %sum,
                "double-entry invariant violated inside posting transaction"
            );
            self.audit
                .append_best_effort(
                    "transfer",
                    &transfer.id.to_string(),
                    "ATOMICITY_BREACH",
                    &json!({
                        "actor": actor,
                        "msg_id": transfer.msg_id,
                        "sum": sum.normalize().to_string(),
                    }),
                )
                .await;
            return Err(PaymentError::AtomicityBreach {
                transfer_id: transfer.id.to_string(),
                sum: sum.normalize().to_string(),
            });
        }

        // Step 7: balances.
        self.store
            .update_balance(&mut tx, source.id, source.balance - transfer.amount)
            .await?;
        self.store
            .update_balance(&mut tx, dest.id, dest.balance + transfer.amount)
            .await?;

        // Step 8: finalize.
        let cleared = self
            .store
            .finalize_transfer(&mut tx, transfer.id, TransferStatus::Cleared, Utc::now())
            .await?;

        self.store.commit(tx).await?;

        // Step 9: audit, independent scope, after the business commit.
        self.audit
            .append_best_effort(
                "transfer",
                &cleared.id.to_string(),
                "CLEARED",
                &json!({
                    "actor": actor,
                    "amount": cleared.amount.normalize().to_string(),
                    "completed_at": cleared
                        .completed_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_default(),
                    "currency": cleared.currency.as_str(),
                    "destination_iban": dest.iban.as_str(),
                    "msg_id": cleared.msg_id,
                    "source_iban": source.iban.as_str(),
                    "status": cleared.status.as_str(),
                }),
            )
            .await;

        info!(
            transfer_id = %cleared.id,
            msg_id = %cleared.msg_id,
            amount = %cleared.amount,
            "transfer cleared"
        );

        // Step 10: publish only now that a reader would also see it.
        self.hook
            .transfer_committed(TransferEvent::from_transfer(
                &cleared,
                source.iban.clone(),
                dest.iban.clone(),
            ))
            .await;

        Ok(PostResponse {
            outcome: PostOutcome::Posted,
            transfer: cleared,
        })
    }

    async fn acknowledge_duplicate(
        &self,
        existing: Transfer,
        actor: &str,
        action: &str,
    ) -> PostResponse {
        self.audit
            .append_best_effort(
                "transfer",
                &existing.id.to_string(),
                action,
                &json!({
                    "actor": actor,
                    "msg_id": existing.msg_id,
                    "status": existing.status.as_str(),
                }),
            )
            .await;
        info!(
            msg_id = %existing.msg_id,
            status = %existing.status,
            "duplicate message acknowledged"
        );
        PostResponse {
            outcome: PostOutcome::Duplicate,
            transfer: existing,
        }
    }

    async fn invalid<T>(
        &self,
        instruction: &TransferInstruction,
        actor: &str,
        reason: &str,
    ) -> PaymentResult<T> {
        self.audit
            .append_best_effort(
                "message",
                &instruction.msg_id,
                "INVALID_TRANSFER",
                &json!({
                    "actor": actor,
                    "currency": instruction.currency.as_str(),
                    "msg_id": instruction.msg_id,
                    "reason": reason,
                }),
            )
            .await;
        Err(PaymentError::InvalidTransfer {
            reason: reason.to_string(),
        })
    }
}
