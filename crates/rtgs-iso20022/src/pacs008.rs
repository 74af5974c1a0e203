//! pacs.008.001.10 parsing
//!
//! Event-driven read tracking the element path; fields are collected by
//! their position in the tree so agent blocks and ultimate parties do not
//! shadow debtor/creditor data. One `CdtTrfTxInf` per message; multi-batch
//! messages are split upstream.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use rust_decimal::Decimal;

use rtgs_types::{Currency, Iban, Party, TransferInstruction};

use crate::{MessageError, MessageResult, PACS008_NAMESPACE};

/// Parsed inbound credit transfer
#[derive(Debug, Clone)]
pub struct Pacs008 {
    pub msg_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub end_to_end_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub debtor: Party,
    pub creditor: Party,
}

impl Pacs008 {
    /// Project to the internal instruction consumed by screening and posting
    pub fn to_instruction(&self) -> TransferInstruction {
        TransferInstruction {
            msg_id: self.msg_id.clone(),
            end_to_end_id: self.end_to_end_id.clone(),
            amount: self.amount,
            currency: self.currency,
            debtor: self.debtor.clone(),
            creditor: self.creditor.clone(),
        }
    }
}

const FIELD_PATHS: &[(&str, &[&str])] = &[
    ("msg_id", &["GrpHdr", "MsgId"]),
    ("created_at", &["GrpHdr", "CreDtTm"]),
    ("nb_of_txs", &["GrpHdr", "NbOfTxs"]),
    ("end_to_end_id", &["CdtTrfTxInf", "PmtId", "EndToEndId"]),
    ("amount", &["CdtTrfTxInf", "IntrBkSttlmAmt"]),
    ("debtor_name", &["CdtTrfTxInf", "Dbtr", "Nm"]),
    ("debtor_iban", &["CdtTrfTxInf", "DbtrAcct", "Id", "IBAN"]),
    ("creditor_name", &["CdtTrfTxInf", "Cdtr", "Nm"]),
    ("creditor_iban", &["CdtTrfTxInf", "CdtrAcct", "Id", "IBAN"]),
];

/// Parse and structurally validate a pacs.008.001.10 document
pub fn parse_pacs008(xml: &str) -> MessageResult<Pacs008> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut fields: HashMap<&'static str, String> = HashMap::new();
    let mut currency: Option<String> = None;
    let mut tx_blocks = 0usize;
    let mut namespace_ok = false;

    loop {
        match reader.read_event() {
            Err(e) => return Err(MessageError::InvalidXml(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(start)) => {
                let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();

                if path.is_empty() {
                    if name != "Document" {
                        return Err(MessageError::SchemaViolation(format!(
                            "root element is {}, expected Document",
                            name
                        )));
                    }
                    for attr in start.attributes() {
                        let attr = attr.map_err(|e| MessageError::InvalidXml(e.to_string()))?;
                        if attr.key.as_ref() == b"xmlns" {
                            let value = attr
                                .unescape_value()
                                .map_err(|e| MessageError::InvalidXml(e.to_string()))?;
                            if value != PACS008_NAMESPACE {
                                return Err(MessageError::SchemaViolation(format!(
                                    "unexpected namespace {}",
                                    value
                                )));
                            }
                            namespace_ok = true;
                        }
                    }
                }

                if name == "CdtTrfTxInf" {
                    tx_blocks += 1;
                }
                if name == "IntrBkSttlmAmt" {
                    for attr in start.attributes() {
                        let attr = attr.map_err(|e| MessageError::InvalidXml(e.to_string()))?;
                        if attr.key.as_ref() == b"Ccy" {
                            currency = Some(
                                attr.unescape_value()
                                    .map_err(|e| MessageError::InvalidXml(e.to_string()))?
                                    .into_owned(),
                            );
                        }
                    }
                }

                path.push(name);
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(text)) => {
                let value = text
                    .unescape()
                    .map_err(|e| MessageError::InvalidXml(e.to_string()))?
                    .trim()
                    .to_string();
                if value.is_empty() {
                    continue;
                }
                for (key, suffix) in FIELD_PATHS {
                    if path_ends_with(&path, suffix) {
                        // First occurrence wins; later tx blocks are rejected
                        // by the count check anyway.
                        fields.entry(key).or_insert(value);
                        break;
                    }
                }
            }
            Ok(_) => {}
        }
    }

    if !namespace_ok {
        return Err(MessageError::SchemaViolation(
            "missing pacs.008.001.10 namespace".to_string(),
        ));
    }
    match tx_blocks {
        0 => return Err(MessageError::missing("CdtTrfTxInf")),
        1 => {}
        n => {
            return Err(MessageError::SchemaViolation(format!(
                "{} transaction blocks; single-transaction messages only",
                n
            )))
        }
    }
    if let Some(nb) = fields.get("nb_of_txs") {
        if nb != "1" {
            return Err(MessageError::SchemaViolation(format!(
                "NbOfTxs is {}, expected 1",
                nb
            )));
        }
    }

    let msg_id = required(&fields, "msg_id", "GrpHdr/MsgId")?;
    if msg_id.len() > 35 {
        return Err(MessageError::SchemaViolation(
            "MsgId exceeds 35 characters".to_string(),
        ));
    }
    let end_to_end_id = required(&fields, "end_to_end_id", "PmtId/EndToEndId")?;

    let amount_text = required(&fields, "amount", "IntrBkSttlmAmt")?;
    let amount: Decimal = amount_text.parse().map_err(|_| {
        MessageError::SchemaViolation(format!("unparseable settlement amount {}", amount_text))
    })?;
    if amount <= Decimal::ZERO {
        return Err(MessageError::SchemaViolation(format!(
            "settlement amount must be positive, got {}",
            amount
        )));
    }

    let currency_code = currency.ok_or_else(|| MessageError::missing("IntrBkSttlmAmt@Ccy"))?;
    let currency = Currency::new(&currency_code).map_err(|e| {
        MessageError::SchemaViolation(e.to_string())
    })?;

    let debtor = Party {
        name: required(&fields, "debtor_name", "Dbtr/Nm")?,
        iban: parse_iban(&required(&fields, "debtor_iban", "DbtrAcct/Id/IBAN")?)?,
    };
    let creditor = Party {
        name: required(&fields, "creditor_name", "Cdtr/Nm")?,
        iban: parse_iban(&required(&fields, "creditor_iban", "CdtrAcct/Id/IBAN")?)?,
    };

    let created_at = match fields.get("created_at") {
        Some(raw) => Some(parse_iso_datetime(raw)?),
        None => None,
    };

    Ok(Pacs008 {
        msg_id,
        created_at,
        end_to_end_id,
        amount,
        currency,
        debtor,
        creditor,
    })
}

fn path_ends_with(path: &[String], suffix: &[&str]) -> bool {
    path.len() >= suffix.len()
        && path[path.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a == b)
}

fn required(
    fields: &HashMap<&'static str, String>,
    key: &'static str,
    path: &str,
) -> MessageResult<String> {
    fields
        .get(key)
        .cloned()
        .ok_or_else(|| MessageError::missing(path))
}

fn parse_iban(raw: &str) -> MessageResult<Iban> {
    Iban::new(raw).map_err(|e| MessageError::SchemaViolation(e.to_string()))
}

/// ISO dateTime: offset form or naive (treated as UTC)
fn parse_iso_datetime(raw: &str) -> MessageResult<DateTime<Utc>> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Ok(with_offset.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| MessageError::SchemaViolation(format!("unparseable CreDtTm {}", raw)))
}
