//! pacs.002.001.12 status reports
//!
//! Outbound answer for everything that did not settle silently: hard
//! rejects map to group status `RJCT`, compliance holds to `PDNG`. The
//! transaction block mirrors the group status when the individual
//! transaction is known; a status-reason block is included only when a
//! recognized external code was supplied.

use std::io::Cursor;

use chrono::{SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use uuid::Uuid;

use crate::{MessageError, MessageResult, PACS002_NAMESPACE, PACS008_MSG_NM_ID};

/// ISO group/transaction status carried by the report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStatus {
    /// Rejected
    Rjct,
    /// Pending (compliance hold)
    Pdng,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rjct => "RJCT",
            Self::Pdng => "PDNG",
        }
    }
}

/// Optional status-reason block
#[derive(Debug, Clone)]
pub struct StatusReason {
    /// External reason code (e.g. AM04, RR04, FF01)
    pub code: String,
    /// Human-readable addition
    pub additional_info: Option<String>,
}

/// Outbound FIToFIPmtStsRpt
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub original_msg_id: String,
    pub status: ReportStatus,
    pub reason: Option<StatusReason>,
    /// Present when the individual transaction is known
    pub original_end_to_end_id: Option<String>,
}

impl StatusReport {
    pub fn rejected(original_msg_id: impl Into<String>) -> Self {
        Self {
            original_msg_id: original_msg_id.into(),
            status: ReportStatus::Rjct,
            reason: None,
            original_end_to_end_id: None,
        }
    }

    pub fn pending(original_msg_id: impl Into<String>) -> Self {
        Self {
            original_msg_id: original_msg_id.into(),
            status: ReportStatus::Pdng,
            reason: None,
            original_end_to_end_id: None,
        }
    }

    pub fn with_reason(mut self, code: impl Into<String>, info: Option<String>) -> Self {
        self.reason = Some(StatusReason {
            code: code.into(),
            additional_info: info,
        });
        self
    }

    pub fn with_end_to_end(mut self, end_to_end_id: impl Into<String>) -> Self {
        self.original_end_to_end_id = Some(end_to_end_id.into());
        self
    }

    /// Serialize to the wire XML
    pub fn to_xml(&self) -> MessageResult<String> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        let w = &mut writer;

        write_event(w, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut document = BytesStart::new("Document");
        document.push_attribute(("xmlns", PACS002_NAMESPACE));
        write_event(w, Event::Start(document))?;
        write_event(w, Event::Start(BytesStart::new("FIToFIPmtStsRpt")))?;

        write_event(w, Event::Start(BytesStart::new("GrpHdr")))?;
        text_element(w, "MsgId", &Uuid::new_v4().to_string())?;
        text_element(
            w,
            "CreDtTm",
            &Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        )?;
        write_event(w, Event::End(BytesEnd::new("GrpHdr")))?;

        write_event(w, Event::Start(BytesStart::new("OrgnlGrpInfAndSts")))?;
        text_element(w, "OrgnlMsgId", &self.original_msg_id)?;
        text_element(w, "OrgnlMsgNmId", PACS008_MSG_NM_ID)?;
        text_element(w, "GrpSts", self.status.as_str())?;
        if let Some(reason) = &self.reason {
            write_event(w, Event::Start(BytesStart::new("StsRsnInf")))?;
            write_event(w, Event::Start(BytesStart::new("Rsn")))?;
            text_element(w, "Cd", &reason.code)?;
            write_event(w, Event::End(BytesEnd::new("Rsn")))?;
            if let Some(info) = &reason.additional_info {
                text_element(w, "AddtlInf", info)?;
            }
            write_event(w, Event::End(BytesEnd::new("StsRsnInf")))?;
        }
        write_event(w, Event::End(BytesEnd::new("OrgnlGrpInfAndSts")))?;

        if let Some(end_to_end) = &self.original_end_to_end_id {
            write_event(w, Event::Start(BytesStart::new("TxInfAndSts")))?;
            text_element(w, "OrgnlEndToEndId", end_to_end)?;
            text_element(w, "TxSts", self.status.as_str())?;
            write_event(w, Event::End(BytesEnd::new("TxInfAndSts")))?;
        }

        write_event(w, Event::End(BytesEnd::new("FIToFIPmtStsRpt")))?;
        write_event(w, Event::End(BytesEnd::new("Document")))?;

        let bytes = writer.into_inner().into_inner();
        String::from_utf8(bytes).map_err(|e| MessageError::Write(e.to_string()))
    }
}

fn write_event(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> MessageResult<()> {
    writer
        .write_event(event)
        .map_err(|e| MessageError::Write(e.to_string()))
}

fn text_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    value: &str,
) -> MessageResult<()> {
    write_event(writer, Event::Start(BytesStart::new(name)))?;
    write_event(writer, Event::Text(BytesText::new(value)))?;
    write_event(writer, Event::End(BytesEnd::new(name)))
}
