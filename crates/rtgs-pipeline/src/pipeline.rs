//! Ingestion pipeline
//!
//! One pass per message: parse, gate, stage, screen, post, answer. The
//! outbound pacs.002 and the event fan-out are both post-commit effects;
//! their failures are logged and dead-lettered, never raised back into the
//! settlement path.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use rtgs_audit::AuditLog;
use rtgs_events::EventBus;
use rtgs_iso20022::{parse_pacs008, StatusReport};
use rtgs_payments::{
    IdempotencyGate, IdempotencyVerdict, PaymentEngine, PaymentError, PrepareOutcome,
    SettlementStore,
};
use rtgs_screening::ComplianceScreener;
use rtgs_types::{Transfer, TransferEvent, TransferInstruction, TransferStatus};

use crate::outbound::{reason_for, OutboundQueue};
use crate::PipelineResult;

/// How one inbound message was resolved
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// Settled with finality
    Settled(Transfer),
    /// Already answered; acknowledged silently
    Duplicate(Transfer),
    /// Held in BLOCKED_AML for manual review
    Held(Transfer),
    /// Terminally rejected
    Rejected(Transfer),
    /// Unparseable or schema-violating payload; answered RJCT
    BadMessage,
}

const ACTOR: &str = "ingestion-pipeline";

/// Wire XML to settled transfer
pub struct IngestionPipeline<S: SettlementStore> {
    engine: Arc<PaymentEngine<S>>,
    screener: Arc<ComplianceScreener<S>>,
    gate: IdempotencyGate<S>,
    audit: AuditLog,
    events: Arc<EventBus>,
    outbound: Arc<dyn OutboundQueue>,
}

impl<S: SettlementStore> IngestionPipeline<S> {
    pub fn new(
        engine: Arc<PaymentEngine<S>>,
        screener: Arc<ComplianceScreener<S>>,
        gate: IdempotencyGate<S>,
        audit: AuditLog,
        events: Arc<EventBus>,
        outbound: Arc<dyn OutboundQueue>,
    ) -> Self {
        Self {
            engine,
            screener,
            gate,
            audit,
            events,
            outbound,
        }
    }

    /// Queue consumer entry point: one wire payload in, one outcome out.
    /// Never requeues; the outcome is the acknowledgement.
    pub async fn on_message(
        &self,
        payload: &[u8],
        correlation_id: Option<&str>,
    ) -> ProcessOutcome {
        let xml = match std::str::from_utf8(payload) {
            Ok(xml) => xml,
            Err(e) => {
                self.answer_bad_message(correlation_id, &e.to_string()).await;
                return ProcessOutcome::BadMessage;
            }
        };

        let parsed = match parse_pacs008(xml) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.answer_bad_message(correlation_id, &e.to_string()).await;
                return ProcessOutcome::BadMessage;
            }
        };

        let instruction = parsed.to_instruction();
        match self.process(&instruction).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(msg_id = %instruction.msg_id, error = %e, "message processing failed");
                self.emit_status(
                    StatusReport::rejected(&instruction.msg_id)
                        .with_end_to_end(&instruction.end_to_end_id),
                )
                .await;
                ProcessOutcome::BadMessage
            }
        }
    }

    /// Synchronous path for API callers holding an already-projected
    /// instruction.
    pub async fn process(
        &self,
        instruction: &TransferInstruction,
    ) -> PipelineResult<ProcessOutcome> {
        // Duplicate suppression, read side first.
        if let IdempotencyVerdict::Duplicate(existing) =
            self.gate.check(&instruction.msg_id).await?
        {
            self.audit
                .append_best_effort(
                    "transfer",
                    &existing.id.to_string(),
                    "DUPLICATE_ATTEMPT",
                    &json!({
                        "actor": ACTOR,
                        "msg_id": existing.msg_id,
                        "status": existing.status.as_str(),
                    }),
                )
                .await;
            info!(msg_id = %instruction.msg_id, "duplicate acknowledged silently");
            return Ok(ProcessOutcome::Duplicate(existing));
        }

        // Stage the PENDING transfer; the unique index settles any race the
        // read missed.
        let transfer = match self.engine.prepare(instruction, ACTOR).await? {
            PrepareOutcome::Duplicate(existing) => {
                return Ok(ProcessOutcome::Duplicate(existing))
            }
            PrepareOutcome::Created(transfer) => transfer,
        };

        // The PENDING row is committed; that transition is observable too.
        self.events.publish(TransferEvent::from_transfer(
            &transfer,
            instruction.debtor.iban.clone(),
            instruction.creditor.iban.clone(),
        ));

        // Compliance: debtor and creditor.
        let parties = [instruction.debtor.clone(), instruction.creditor.clone()];
        let screening = self.screener.evaluate(&transfer, &parties).await?;

        if screening.decision.holds_transfer() {
            let held = screening.transfer;
            // The hold is committed; fan it out to the worklist and answer
            // the originator with a pending status.
            self.events.publish(TransferEvent::from_transfer(
                &held,
                instruction.debtor.iban.clone(),
                instruction.creditor.iban.clone(),
            ));
            let mut report =
                StatusReport::pending(&held.msg_id).with_end_to_end(&instruction.end_to_end_id);
            if let Some((code, info)) = reason_for("BLOCKED_AML") {
                report = report.with_reason(code, Some(info));
            }
            self.emit_status(report).await;
            return Ok(ProcessOutcome::Held(held));
        }

        // Clean screen: settle.
        match self.engine.post_prepared(transfer.id, ACTOR).await {
            Ok(response) => Ok(ProcessOutcome::Settled(response.transfer)),
            Err(PaymentError::InsufficientFunds { .. }) => {
                // The engine committed the REJECTED terminal already.
                let rejected = self
                    .engine
                    .store()
                    .transfer_by_id(transfer.id)
                    .await?
                    .unwrap_or(transfer);
                let mut report = StatusReport::rejected(&rejected.msg_id)
                    .with_end_to_end(&instruction.end_to_end_id);
                if let Some((code, info)) = reason_for("INSUFFICIENT_FUNDS") {
                    report = report.with_reason(code, Some(info));
                }
                self.emit_status(report).await;
                Ok(ProcessOutcome::Rejected(rejected))
            }
            Err(e) => {
                // Retry budget exhausted or a hard posting failure: close
                // the transfer out and answer RJCT.
                warn!(transfer_id = %transfer.id, error = %e, "posting failed; rejecting");
                let rejected = match self
                    .engine
                    .store()
                    .transition_status(
                        transfer.id,
                        TransferStatus::Pending,
                        TransferStatus::Rejected,
                        Some(chrono::Utc::now()),
                    )
                    .await
                {
                    Ok(rejected) => rejected,
                    Err(transition_err) => {
                        warn!(
                            transfer_id = %transfer.id,
                            error = %transition_err,
                            "could not close out failed transfer"
                        );
                        transfer
                    }
                };
                self.emit_status(
                    StatusReport::rejected(&rejected.msg_id)
                        .with_end_to_end(&instruction.end_to_end_id),
                )
                .await;
                Ok(ProcessOutcome::Rejected(rejected))
            }
        }
    }

    async fn answer_bad_message(&self, correlation_id: Option<&str>, error: &str) {
        let reference = correlation_id.unwrap_or("UNKNOWN");
        warn!(reference, error, "rejecting unparseable inbound message");
        self.audit
            .append_best_effort(
                "message",
                reference,
                "INVALID_XML",
                &json!({
                    "actor": ACTOR,
                    "error": error,
                }),
            )
            .await;

        let mut report = StatusReport::rejected(reference);
        if let Some((code, info)) = reason_for("INVALID_XML") {
            report = report.with_reason(code, Some(info));
        }
        self.emit_status(report).await;
    }

    /// Best-effort outbound emission; failures dead-letter, never raise
    async fn emit_status(&self, report: StatusReport) {
        if let Err(e) = self.outbound.publish_status(&report).await {
            self.events.dead_letter("pacs002-outbound", &e.to_string());
        }
    }
}
