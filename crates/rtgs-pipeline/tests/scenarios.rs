//! End-to-end settlement scenarios over the in-memory stores

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use rtgs_audit::{
    AuditLog, AuditStore, ChainVerifier, MemoryAuditStore, TracingAlertSink, VerifierConfig,
};
use rtgs_events::EventBus;
use rtgs_iso20022::ReportStatus;
use rtgs_payments::{
    IdempotencyGate, MemorySettlementStore, PaymentConfig, PaymentEngine, SettlementStore,
};
use rtgs_pipeline::{
    EventBusHook, IngestionPipeline, MemoryOutbound, ProcessOutcome, ReviewService,
};
use rtgs_screening::{
    ComplianceScreener, FuzzyConfig, FuzzyMatcher, MemorySanctionsProvider, RuleConfig,
    RuleEngine,
};
use rtgs_types::{
    Account, Currency, Iban, LedgerEntry, ReviewDecision, SanctionSource, TransferStatus,
};

struct Harness {
    store: Arc<MemorySettlementStore>,
    audit_store: Arc<MemoryAuditStore>,
    audit: AuditLog,
    events: Arc<EventBus>,
    outbound: Arc<MemoryOutbound>,
    pipeline: IngestionPipeline<MemorySettlementStore>,
    review: ReviewService<MemorySettlementStore>,
    alice: Account,
    bob: Account,
}

async fn harness() -> Harness {
    let store = Arc::new(MemorySettlementStore::new());
    let audit_store = Arc::new(MemoryAuditStore::new());
    let audit = AuditLog::new(audit_store.clone());
    let events = Arc::new(EventBus::default());
    let outbound = Arc::new(MemoryOutbound::new());

    let alice = store
        .create_account(
            Iban::new("DE89370400440532013000").unwrap(),
            "Alice".to_string(),
            Currency::eur(),
            dec!(10000),
        )
        .await
        .unwrap();
    let bob = store
        .create_account(
            Iban::new("GB29NWBK60161331926819").unwrap(),
            "Bob".to_string(),
            Currency::eur(),
            dec!(5000),
        )
        .await
        .unwrap();

    let provider = Arc::new(MemorySanctionsProvider::new());
    provider.upsert("Osama bin Laden", SanctionSource::Ofac, 95);
    provider.upsert("Saddam Hussein", SanctionSource::Un, 90);
    let matcher = Arc::new(FuzzyMatcher::new(provider, FuzzyConfig::default()));
    matcher.refresh().await.unwrap();

    let engine = Arc::new(PaymentEngine::new(
        store.clone(),
        audit.clone(),
        Arc::new(EventBusHook::new(events.clone())),
        PaymentConfig::default(),
    ));
    let screener = Arc::new(ComplianceScreener::new(
        store.clone(),
        matcher,
        RuleEngine::new(RuleConfig::default()),
        audit.clone(),
    ));

    let pipeline = IngestionPipeline::new(
        engine.clone(),
        screener.clone(),
        IdempotencyGate::new(store.clone()),
        audit.clone(),
        events.clone(),
        outbound.clone(),
    );
    let review = ReviewService::new(engine, screener, events.clone(), outbound.clone());

    Harness {
        store,
        audit_store,
        audit,
        events,
        outbound,
        pipeline,
        review,
        alice,
        bob,
    }
}

fn pacs008(msg_id: &str, amount: &str, debtor_name: &str, debtor_iban: &str) -> Vec<u8> {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Document xmlns="urn:iso:std:iso:20022:tech:xsd:pacs.008.001.10">
  <FIToFICstmrCdtTrf>
    <GrpHdr>
      <MsgId>{msg_id}</MsgId>
      <CreDtTm>2026-03-01T09:30:00.000Z</CreDtTm>
      <NbOfTxs>1</NbOfTxs>
      <SttlmInf><SttlmMtd>CLRG</SttlmMtd></SttlmInf>
    </GrpHdr>
    <CdtTrfTxInf>
      <PmtId><EndToEndId>E2E-{msg_id}</EndToEndId></PmtId>
      <IntrBkSttlmAmt Ccy="EUR">{amount}</IntrBkSttlmAmt>
      <Dbtr><Nm>{debtor_name}</Nm></Dbtr>
      <DbtrAcct><Id><IBAN>{debtor_iban}</IBAN></Id></DbtrAcct>
      <Cdtr><Nm>Clean Receiver</Nm></Cdtr>
      <CdtrAcct><Id><IBAN>GB29NWBK60161331926819</IBAN></Id></CdtrAcct>
    </CdtTrfTxInf>
  </FIToFICstmrCdtTrf>
</Document>"#
    )
    .into_bytes()
}

async fn balance(harness: &Harness, account: &Account) -> Decimal {
    harness
        .store
        .account_by_id(account.id)
        .await
        .unwrap()
        .unwrap()
        .balance
}

#[tokio::test]
async fn scenario_clean_settlement() {
    let h = harness().await;
    let mut transfers = h.events.subscribe_transfers();

    let outcome = h
        .pipeline
        .on_message(&pacs008("M1", "500.00", "Clean Sender", h.alice.iban.as_str()), None)
        .await;

    let transfer = match outcome {
        ProcessOutcome::Settled(t) => t,
        other => panic!("expected settlement, got {:?}", other),
    };
    assert_eq!(transfer.status, TransferStatus::Cleared);
    assert_eq!(balance(&h, &h.alice).await, dec!(9500));
    assert_eq!(balance(&h, &h.bob).await, dec!(5500));

    let entries = h.store.entries_for_transfer(transfer.id).await.unwrap();
    assert_eq!(entries.len(), 2);
    let sum: Decimal = entries.iter().map(LedgerEntry::signed_amount).sum();
    assert_eq!(sum, Decimal::ZERO);

    // Two committed transitions, both on the transfers topic.
    let first = transfers.recv().await.unwrap();
    assert_eq!(first.status, TransferStatus::Pending);
    let second = transfers.recv().await.unwrap();
    assert_eq!(second.status, TransferStatus::Cleared);
    assert_eq!(second.msg_id, "M1");
    assert!(h.outbound.is_empty(), "clean settlement answers nothing");
}

#[tokio::test]
async fn scenario_idempotent_replay() {
    let h = harness().await;
    let payload = pacs008("M1", "500.00", "Clean Sender", h.alice.iban.as_str());

    let first = h.pipeline.on_message(&payload, None).await;
    let transfer = match first {
        ProcessOutcome::Settled(t) => t,
        other => panic!("expected settlement, got {:?}", other),
    };

    for _ in 0..3 {
        let replay = h.pipeline.on_message(&payload, None).await;
        assert!(matches!(replay, ProcessOutcome::Duplicate(_)));
    }

    assert_eq!(h.store.transfer_count(), 1);
    assert_eq!(balance(&h, &h.alice).await, dec!(9500));
    assert_eq!(balance(&h, &h.bob).await, dec!(5500));

    let records = h
        .audit_store
        .records("transfer", &transfer.id.to_string())
        .await
        .unwrap();
    assert_eq!(records.iter().filter(|r| r.action == "CLEARED").count(), 1);
    assert_eq!(
        records
            .iter()
            .filter(|r| r.action == "DUPLICATE_ATTEMPT")
            .count(),
        3
    );
    assert!(h.outbound.is_empty(), "duplicates are acknowledged silently");
}

#[tokio::test]
async fn scenario_sanctions_block() {
    let h = harness().await;
    let mut worklist = h.events.subscribe_worklist();

    let outcome = h
        .pipeline
        .on_message(
            &pacs008("M3", "500.00", "Osama Bin Laden", h.alice.iban.as_str()),
            None,
        )
        .await;

    let held = match outcome {
        ProcessOutcome::Held(t) => t,
        other => panic!("expected hold, got {:?}", other),
    };
    assert_eq!(held.status, TransferStatus::BlockedAml);
    assert_eq!(balance(&h, &h.alice).await, dec!(10000));
    assert_eq!(balance(&h, &h.bob).await, dec!(5000));
    assert!(h.store.entries_for_transfer(held.id).await.unwrap().is_empty());

    // Outbound answer: group status PDNG with a status-reason block.
    let reports = h.outbound.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, ReportStatus::Pdng);
    assert!(reports[0].reason.is_some());
    let xml = reports[0].to_xml().unwrap();
    assert!(xml.contains("<GrpSts>PDNG</GrpSts>"));
    assert!(xml.contains("<StsRsnInf>"));

    // Compliance audit record references the best match.
    let records = h
        .audit_store
        .records("transfer", &held.id.to_string())
        .await
        .unwrap();
    let screened = records
        .iter()
        .find(|r| r.action == "COMPLIANCE_SCREENED")
        .expect("screening audited");
    assert!(screened.payload.contains("Osama bin Laden"));

    // Worklist fan-out saw the hold.
    let event = worklist.recv().await.unwrap();
    assert_eq!(event.status, TransferStatus::BlockedAml);
    assert_eq!(event.msg_id, "M3");
}

#[tokio::test]
async fn scenario_manual_approve() {
    let h = harness().await;
    let outcome = h
        .pipeline
        .on_message(
            &pacs008("M4", "500.00", "Osama Bin Laden", h.alice.iban.as_str()),
            None,
        )
        .await;
    let held = match outcome {
        ProcessOutcome::Held(t) => t,
        other => panic!("expected hold, got {:?}", other),
    };

    assert_eq!(h.review.worklist().await.unwrap().len(), 1);
    let mut transfers = h.events.subscribe_transfers();

    let settled = h
        .review
        .review(held.id, ReviewDecision::Approve, "reviewer-1", Some("false positive"))
        .await
        .unwrap();
    assert_eq!(settled.status, TransferStatus::Cleared);
    assert_eq!(balance(&h, &h.alice).await, dec!(9500));
    assert_eq!(balance(&h, &h.bob).await, dec!(5500));
    assert_eq!(
        h.store.entries_for_transfer(held.id).await.unwrap().len(),
        2
    );

    let records = h
        .audit_store
        .records("transfer", &held.id.to_string())
        .await
        .unwrap();
    assert!(records.iter().any(|r| r.action == "REVIEW_APPROVED"));
    assert!(records.iter().any(|r| r.action == "CLEARED"));

    let event = transfers.recv().await.unwrap();
    assert_eq!(event.status, TransferStatus::Cleared);
    assert!(h.review.worklist().await.unwrap().is_empty());
}

#[tokio::test]
async fn scenario_insufficient_funds() {
    let h = harness().await;
    let poor = h
        .store
        .create_account(
            Iban::new("FR7630006000011234567890189").unwrap(),
            "Carol".to_string(),
            Currency::eur(),
            dec!(100),
        )
        .await
        .unwrap();

    let outcome = h
        .pipeline
        .on_message(&pacs008("M5", "200.00", "Carol", poor.iban.as_str()), None)
        .await;

    let rejected = match outcome {
        ProcessOutcome::Rejected(t) => t,
        other => panic!("expected rejection, got {:?}", other),
    };
    assert_eq!(rejected.status, TransferStatus::Rejected);
    assert_eq!(balance(&h, &poor).await, dec!(100));

    let records = h
        .audit_store
        .records("transfer", &rejected.id.to_string())
        .await
        .unwrap();
    assert!(records.iter().any(|r| r.action == "INSUFFICIENT_FUNDS"));

    let reports = h.outbound.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, ReportStatus::Rjct);
    let xml = reports[0].to_xml().unwrap();
    assert!(xml.contains("<GrpSts>RJCT</GrpSts>"));
    assert!(xml.contains("<Cd>AM04</Cd>"));
}

#[tokio::test]
async fn scenario_tamper_detection() {
    let h = harness().await;
    let outcome = h
        .pipeline
        .on_message(&pacs008("M6", "500.00", "Clean Sender", h.alice.iban.as_str()), None)
        .await;
    let transfer = match outcome {
        ProcessOutcome::Settled(t) => t,
        other => panic!("expected settlement, got {:?}", other),
    };

    let entity_id = transfer.id.to_string();
    assert!(h.audit.verify("transfer", &entity_id).await.unwrap());

    // Flip one character in the CLEARED record's payload.
    let records = h.audit_store.records("transfer", &entity_id).await.unwrap();
    let (index, cleared) = records
        .iter()
        .enumerate()
        .find(|(_, r)| r.action == "CLEARED")
        .expect("cleared record exists");
    let tampered = cleared.payload.replacen("500", "501", 1);
    assert_ne!(tampered, cleared.payload);
    h.audit_store
        .corrupt_payload("transfer", &entity_id, index, tampered)
        .await
        .unwrap();

    assert!(!h.audit.verify("transfer", &entity_id).await.unwrap());

    // The daily sweep raises exactly one breach for the forged chain.
    let verifier = ChainVerifier::new(
        h.audit.clone(),
        Arc::new(TracingAlertSink),
        VerifierConfig::default(),
    );
    let result = verifier.run_full_sweep().await.unwrap();
    assert_eq!(result.breaches.len(), 1);
    assert_eq!(result.breaches[0].entity_id, entity_id);
    assert_eq!(verifier.breach_count(), 1);
}

#[tokio::test]
async fn scenario_invalid_xml_answers_rjct() {
    let h = harness().await;
    let outcome = h
        .pipeline
        .on_message(b"this is not xml", Some("corr-9"))
        .await;
    assert!(matches!(outcome, ProcessOutcome::BadMessage));

    let reports = h.outbound.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].status, ReportStatus::Rjct);
    assert_eq!(reports[0].original_msg_id, "corr-9");
    let xml = reports[0].to_xml().unwrap();
    assert!(xml.contains("<Cd>FF01</Cd>"));
    assert!(xml.contains("INVALID_XML"));

    let records = h.audit_store.records("message", "corr-9").await.unwrap();
    assert!(records.iter().any(|r| r.action == "INVALID_XML"));
}
