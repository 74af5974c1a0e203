//! Compliance screener
//!
//! Orchestrates the fuzzy matcher and the rule engine, then translates the
//! decision into transfer state in its own transactional scope:
//!
//! - CLEARED leaves the transfer PENDING for the payment engine. The
//!   screener never writes CLEARED; only atomic posting may, or the
//!   "CLEARED implies ledger entries" invariant dies.
//! - BLOCKED and MANUAL_REVIEW park the transfer in BLOCKED_AML.
//!
//! Manual review releases a held transfer back to PENDING (approve) or
//! terminally rejects it, recording the reviewer either way.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::info;

use rtgs_audit::AuditLog;
use rtgs_payments::SettlementStore;
use rtgs_types::{Party, ReviewDecision, Transfer, TransferId, TransferStatus};

use crate::{
    ComplianceError, ComplianceResult, FuzzyMatcher, RuleEngine, SanctionMatch,
    ScreeningDecision,
};

/// Result of screening one transfer
#[derive(Debug, Clone)]
pub struct ScreeningOutcome {
    pub decision: ScreeningDecision,
    /// Union of matches across all screened parties, best first
    pub matches: Vec<SanctionMatch>,
    /// Transfer state after the decision was applied
    pub transfer: Transfer,
}

impl ScreeningOutcome {
    pub fn best_match(&self) -> Option<&SanctionMatch> {
        self.matches.first()
    }
}

/// Risk-based screening over debtor and creditor parties
pub struct ComplianceScreener<S: SettlementStore> {
    store: Arc<S>,
    matcher: Arc<FuzzyMatcher>,
    rules: RuleEngine,
    audit: AuditLog,
}

impl<S: SettlementStore> ComplianceScreener<S> {
    pub fn new(
        store: Arc<S>,
        matcher: Arc<FuzzyMatcher>,
        rules: RuleEngine,
        audit: AuditLog,
    ) -> Self {
        Self {
            store,
            matcher,
            rules,
            audit,
        }
    }

    pub fn matcher(&self) -> &Arc<FuzzyMatcher> {
        &self.matcher
    }

    /// Screen a PENDING transfer against the sanctions set.
    ///
    /// Debtor and creditor parties are both screened; intermediaries are
    /// out of scope.
    pub async fn evaluate(
        &self,
        transfer: &Transfer,
        parties: &[Party],
    ) -> ComplianceResult<ScreeningOutcome> {
        if transfer.status != TransferStatus::Pending {
            return Err(ComplianceError::State(format!(
                "transfer {} is {}, only PENDING transfers are screened",
                transfer.id, transfer.status
            )));
        }

        let threshold = self.matcher.config().levenshtein_threshold;
        let mut matches: Vec<SanctionMatch> = Vec::new();
        for party in parties {
            matches.extend(self.matcher.find(&party.name, threshold).await?);
        }
        matches.sort_by(|a, b| b.score.cmp(&a.score));

        let decision = self.rules.decide(transfer.amount, &matches);

        let transfer = if decision.holds_transfer() {
            self.store
                .transition_status(
                    transfer.id,
                    TransferStatus::Pending,
                    TransferStatus::BlockedAml,
                    None,
                )
                .await?
        } else {
            transfer.clone()
        };

        let best = matches.first();
        self.audit
            .append_best_effort(
                "transfer",
                &transfer.id.to_string(),
                "COMPLIANCE_SCREENED",
                &json!({
                    "amount": transfer.amount.normalize().to_string(),
                    "best_match": best.map(|m| json!({
                        "name": m.sanction.name,
                        "score": m.score,
                        "source": m.sanction.source.as_str(),
                    })),
                    "currency": transfer.currency.as_str(),
                    "decision": decision.as_str(),
                    "match_count": matches.len(),
                    "msg_id": transfer.msg_id,
                    "screened_parties": parties.iter().map(|p| p.name.clone()).collect::<Vec<_>>(),
                }),
            )
            .await;

        info!(
            transfer_id = %transfer.id,
            decision = %decision,
            matches = matches.len(),
            "compliance screening complete"
        );

        Ok(ScreeningOutcome {
            decision,
            matches,
            transfer,
        })
    }

    /// Apply a human decision to a transfer held in BLOCKED_AML.
    ///
    /// Approve releases it back to PENDING for posting; reject is terminal.
    /// Anything else is a replay and fails after being audited.
    pub async fn apply_manual(
        &self,
        transfer_id: TransferId,
        decision: ReviewDecision,
        reviewer: &str,
        notes: Option<&str>,
    ) -> ComplianceResult<Transfer> {
        let transfer = self
            .store
            .transfer_by_id(transfer_id)
            .await?
            .ok_or_else(|| ComplianceError::TransferNotFound {
                transfer_id: transfer_id.to_string(),
            })?;

        if transfer.status != TransferStatus::BlockedAml {
            self.audit
                .append_best_effort(
                    "transfer",
                    &transfer_id.to_string(),
                    "REVIEW_REPLAY",
                    &json!({
                        "decision": decision.as_str(),
                        "reviewer": reviewer,
                        "status": transfer.status.as_str(),
                    }),
                )
                .await;
            return Err(ComplianceError::ReviewReplay {
                transfer_id: transfer_id.to_string(),
                status: transfer.status.to_string(),
            });
        }

        let (next, completed_at, action) = match decision {
            ReviewDecision::Approve => (TransferStatus::Pending, None, "REVIEW_APPROVED"),
            ReviewDecision::Reject => {
                (TransferStatus::Rejected, Some(Utc::now()), "REVIEW_REJECTED")
            }
        };

        let updated = self
            .store
            .transition_status(transfer_id, TransferStatus::BlockedAml, next, completed_at)
            .await?;

        self.audit
            .append_best_effort(
                "transfer",
                &transfer_id.to_string(),
                action,
                &json!({
                    "msg_id": updated.msg_id,
                    "notes": notes,
                    "reviewer": reviewer,
                }),
            )
            .await;

        info!(
            transfer_id = %transfer_id,
            decision = %decision,
            reviewer,
            "manual review applied"
        );
        Ok(updated)
    }
}
