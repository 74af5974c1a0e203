//! Manual review service
//!
//! Closes out transfers parked in BLOCKED_AML. Approval releases the
//! transfer to PENDING and immediately posts it; rejection is terminal and
//! answers the originator with a final RJCT.

use std::sync::Arc;

use tracing::info;

use rtgs_events::EventBus;
use rtgs_iso20022::StatusReport;
use rtgs_payments::{PaymentEngine, PaymentError, SettlementStore};
use rtgs_screening::ComplianceScreener;
use rtgs_types::{ReviewDecision, Transfer, TransferId};

use crate::outbound::{reason_for, OutboundQueue};
use crate::PipelineResult;

/// Applies human decisions to held transfers
pub struct ReviewService<S: SettlementStore> {
    engine: Arc<PaymentEngine<S>>,
    screener: Arc<ComplianceScreener<S>>,
    events: Arc<EventBus>,
    outbound: Arc<dyn OutboundQueue>,
}

impl<S: SettlementStore> ReviewService<S> {
    pub fn new(
        engine: Arc<PaymentEngine<S>>,
        screener: Arc<ComplianceScreener<S>>,
        events: Arc<EventBus>,
        outbound: Arc<dyn OutboundQueue>,
    ) -> Self {
        Self {
            engine,
            screener,
            events,
            outbound,
        }
    }

    /// The open worklist, oldest first
    pub async fn worklist(&self) -> PipelineResult<Vec<Transfer>> {
        Ok(self.engine.store().blocked_transfers().await?)
    }

    /// Apply a reviewer's decision and return the transfer's final state
    pub async fn review(
        &self,
        transfer_id: TransferId,
        decision: ReviewDecision,
        reviewer: &str,
        notes: Option<&str>,
    ) -> PipelineResult<Transfer> {
        match decision {
            ReviewDecision::Approve => {
                self.screener
                    .apply_manual(transfer_id, ReviewDecision::Approve, reviewer, notes)
                    .await?;
                match self.engine.post_prepared(transfer_id, reviewer).await {
                    Ok(response) => {
                        info!(transfer_id = %transfer_id, reviewer, "approved and settled");
                        Ok(response.transfer)
                    }
                    Err(PaymentError::InsufficientFunds { .. }) => {
                        // Approved but unfunded; the engine committed the
                        // REJECTED terminal and the originator gets a final
                        // answer.
                        let rejected = self
                            .engine
                            .store()
                            .transfer_by_id(transfer_id)
                            .await?
                            .ok_or(PaymentError::TransferNotFound {
                                transfer_id: transfer_id.to_string(),
                            })?;
                        let mut report = StatusReport::rejected(&rejected.msg_id);
                        if let Some((code, info)) = reason_for("INSUFFICIENT_FUNDS") {
                            report = report.with_reason(code, Some(info));
                        }
                        self.emit_status(report).await;
                        Ok(rejected)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            ReviewDecision::Reject => {
                let rejected = self
                    .screener
                    .apply_manual(transfer_id, ReviewDecision::Reject, reviewer, notes)
                    .await?;
                let mut report = StatusReport::rejected(&rejected.msg_id);
                if let Some((code, info)) = reason_for("REVIEW_REJECTED") {
                    report = report.with_reason(code, Some(info));
                }
                self.emit_status(report).await;
                info!(transfer_id = %transfer_id, reviewer, "rejected after review");
                Ok(rejected)
            }
        }
    }

    async fn emit_status(&self, report: StatusReport) {
        if let Err(e) = self.outbound.publish_status(&report).await {
            self.events.dead_letter("pacs002-review", &e.to_string());
        }
    }
}
