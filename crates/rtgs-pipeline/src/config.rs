//! Pipeline configuration

/// Broker subjects and connection
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub url: String,
    pub inbound_subject: String,
    pub dlq_subject: String,
    pub outbound_subject: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            inbound_subject: "bank.inbound".to_string(),
            dlq_subject: "bank.inbound.dlq".to_string(),
            outbound_subject: "bank.outbound.pacs002".to_string(),
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("QUEUE_URL").unwrap_or(defaults.url),
            inbound_subject: std::env::var("QUEUE_INBOUND_SUBJECT")
                .unwrap_or(defaults.inbound_subject),
            dlq_subject: std::env::var("QUEUE_DLQ_SUBJECT").unwrap_or(defaults.dlq_subject),
            outbound_subject: std::env::var("QUEUE_OUTBOUND_SUBJECT")
                .unwrap_or(defaults.outbound_subject),
        }
    }
}

/// Worker pool and external ingestion schedule surface
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Bounded concurrency for inbound message handling
    pub worker_concurrency: usize,
    /// Sanctions list sources consumed by the out-of-band scrapers
    pub sanctions_ofac_url: Option<String>,
    pub sanctions_eu_url: Option<String>,
    pub sanctions_un_url: Option<String>,
    /// Wall-clock schedule for sanctions ingestion (HH:MM:SS, UTC)
    pub sanctions_refresh_at: Option<String>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 16,
            sanctions_ofac_url: None,
            sanctions_eu_url: None,
            sanctions_un_url: None,
            sanctions_refresh_at: None,
        }
    }
}

impl IngestionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            worker_concurrency: std::env::var("INGESTION_WORKER_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.worker_concurrency),
            sanctions_ofac_url: std::env::var("INGESTION_SANCTIONS_OFAC_URL").ok(),
            sanctions_eu_url: std::env::var("INGESTION_SANCTIONS_EU_URL").ok(),
            sanctions_un_url: std::env::var("INGESTION_SANCTIONS_UN_URL").ok(),
            sanctions_refresh_at: std::env::var("INGESTION_SANCTIONS_REFRESH_AT").ok(),
        }
    }
}
