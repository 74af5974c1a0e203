//! Outbound status queue
//!
//! pacs.002 reports leave through this seam. The in-memory queue backs the
//! scenario tests; the NATS queue is the production transport.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use rtgs_iso20022::StatusReport;

use crate::{PipelineError, PipelineResult};

/// Internal rejection reasons mapped to recognized ISO external codes.
/// Unrecognized reasons omit the status-reason block.
pub fn reason_for(internal: &str) -> Option<(&'static str, String)> {
    let code = match internal {
        "INVALID_XML" => "FF01",
        "INSUFFICIENT_FUNDS" => "AM04",
        "BLOCKED_AML" | "REVIEW_REJECTED" => "RR04",
        _ => return None,
    };
    Some((code, internal.to_string()))
}

/// Transport seam for pacs.002 emission
#[async_trait]
pub trait OutboundQueue: Send + Sync {
    async fn publish_status(&self, report: &StatusReport) -> PipelineResult<()>;
}

/// Collects reports for assertions
#[derive(Default)]
pub struct MemoryOutbound {
    reports: Mutex<Vec<StatusReport>>,
}

impl MemoryOutbound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<StatusReport> {
        self.reports.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

#[async_trait]
impl OutboundQueue for MemoryOutbound {
    async fn publish_status(&self, report: &StatusReport) -> PipelineResult<()> {
        // Marshal eagerly so a malformed report fails here, as it would on
        // the wire.
        let _ = report.to_xml().map_err(PipelineError::Message)?;
        self.reports.lock().push(report.clone());
        Ok(())
    }
}

/// Publishes marshalled reports to the outbound subject
pub struct NatsOutbound {
    client: async_nats::Client,
    subject: String,
}

impl NatsOutbound {
    pub fn new(client: async_nats::Client, subject: String) -> Self {
        Self { client, subject }
    }
}

#[async_trait]
impl OutboundQueue for NatsOutbound {
    async fn publish_status(&self, report: &StatusReport) -> PipelineResult<()> {
        let xml = report.to_xml().map_err(PipelineError::Message)?;
        self.client
            .publish(self.subject.clone(), xml.into())
            .await
            .map_err(|e| PipelineError::Queue(e.to_string()))?;
        debug!(
            original_msg_id = %report.original_msg_id,
            status = report.status.as_str(),
            "status report published"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_mapping() {
        assert_eq!(reason_for("INVALID_XML").unwrap().0, "FF01");
        assert_eq!(reason_for("INSUFFICIENT_FUNDS").unwrap().0, "AM04");
        assert_eq!(reason_for("BLOCKED_AML").unwrap().0, "RR04");
        assert!(reason_for("SOMETHING_ELSE").is_none());
    }

    #[tokio::test]
    async fn test_memory_outbound_collects() {
        let outbound = MemoryOutbound::new();
        outbound
            .publish_status(&StatusReport::rejected("M1"))
            .await
            .unwrap();
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound.reports()[0].original_msg_id, "M1");
    }
}
