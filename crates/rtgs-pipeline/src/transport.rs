//! NATS consumer loop
//!
//! Subscribes the durable queue group on the inbound subject and hands
//! payloads to the pipeline on a semaphore-bounded worker pool. Payloads
//! that fail parsing are answered RJCT by the pipeline and additionally
//! forwarded to the DLQ subject for forensics; nothing is requeued.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use rtgs_payments::SettlementStore;

use crate::{IngestionConfig, IngestionPipeline, PipelineError, PipelineResult, ProcessOutcome, QueueConfig};

const QUEUE_GROUP: &str = "rtgs-settlement";
const CORRELATION_HEADER: &str = "message-id";

/// Run the inbound consumer until shutdown is signalled
pub async fn run_consumer<S: SettlementStore>(
    client: async_nats::Client,
    queue: QueueConfig,
    ingestion: IngestionConfig,
    pipeline: Arc<IngestionPipeline<S>>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> PipelineResult<()> {
    let mut subscriber = client
        .queue_subscribe(queue.inbound_subject.clone(), QUEUE_GROUP.to_string())
        .await
        .map_err(|e| PipelineError::Queue(e.to_string()))?;

    let workers = Arc::new(Semaphore::new(ingestion.worker_concurrency.max(1)));
    info!(
        subject = %queue.inbound_subject,
        concurrency = ingestion.worker_concurrency,
        "inbound consumer running"
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("inbound consumer shutting down");
                    break;
                }
            }
            message = subscriber.next() => {
                let Some(message) = message else {
                    warn!("inbound subscription closed by server");
                    break;
                };
                let Ok(permit) = workers.clone().acquire_owned().await else {
                    break;
                };

                let pipeline = pipeline.clone();
                let client = client.clone();
                let dlq_subject = queue.dlq_subject.clone();
                tokio::spawn(async move {
                    let correlation = message
                        .headers
                        .as_ref()
                        .and_then(|headers| headers.get(CORRELATION_HEADER))
                        .map(|value| value.as_str().to_string());

                    let outcome = pipeline
                        .on_message(&message.payload, correlation.as_deref())
                        .await;

                    if matches!(outcome, ProcessOutcome::BadMessage) {
                        if let Err(e) = client
                            .publish(dlq_subject, message.payload.clone())
                            .await
                        {
                            warn!(error = %e, "DLQ forward failed");
                        }
                    }
                    drop(permit);
                });
            }
        }
    }
    Ok(())
}
