//! RTGS Events - Real-time fan-out of committed transfer transitions
//!
//! Two broadcast topics back the external WebSocket channel:
//!
//! - `transfers`: every committed transfer summary
//! - `compliance.worklist`: additionally, transfers held in BLOCKED_AML
//!
//! Publication is best-effort and strictly post-commit. A lagging or absent
//! subscriber never fails the settlement path; drops are counted and logged
//! as the dead-letter observability signal.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use rtgs_types::{TransferEvent, TransferStatus};

/// Fan-out configuration
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Ring capacity per topic; slow subscribers beyond this lag see drops
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Broadcast fan-out over the transfer and compliance-worklist topics
pub struct EventBus {
    transfers: broadcast::Sender<TransferEvent>,
    worklist: broadcast::Sender<TransferEvent>,
    published: AtomicU64,
    dead_lettered: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        let (transfers, _) = broadcast::channel(config.channel_capacity);
        let (worklist, _) = broadcast::channel(config.channel_capacity);
        Self {
            transfers,
            worklist,
            published: AtomicU64::new(0),
            dead_lettered: AtomicU64::new(0),
        }
    }

    /// Publish a committed transfer transition.
    ///
    /// Only call after the owning transaction committed: a subscriber must
    /// never observe a transfer a store read would not also return.
    pub fn publish(&self, event: TransferEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);

        if self.transfers.send(event.clone()).is_err() {
            // No live subscribers; nothing to deliver is not a failure.
            debug!(transfer_id = %event.transfer_id, "no transfer subscribers");
        }

        if event.status == TransferStatus::BlockedAml
            && self.worklist.send(event.clone()).is_err()
        {
            debug!(transfer_id = %event.transfer_id, "no worklist subscribers");
        }
    }

    /// Record a delivery failure from a downstream transport
    pub fn dead_letter(&self, context: &str, error: &str) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
        warn!(context, error, "event delivery dead-lettered");
    }

    pub fn subscribe_transfers(&self) -> broadcast::Receiver<TransferEvent> {
        self.transfers.subscribe()
    }

    pub fn subscribe_worklist(&self) -> broadcast::Receiver<TransferEvent> {
        self.worklist.subscribe()
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn dead_letter_count(&self) -> u64 {
        self.dead_lettered.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rtgs_types::{Iban, TransferId};
    use rust_decimal_macros::dec;

    fn event(status: TransferStatus) -> TransferEvent {
        TransferEvent {
            transfer_id: TransferId::new(),
            msg_id: "m-1".to_string(),
            status,
            amount: dec!(500),
            source_iban: Iban::new("DE89370400440532013000").unwrap(),
            destination_iban: Iban::new("GB29NWBK60161331926819").unwrap(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_cleared_goes_to_transfers_only() {
        let bus = EventBus::default();
        let mut transfers = bus.subscribe_transfers();
        let mut worklist = bus.subscribe_worklist();

        bus.publish(event(TransferStatus::Cleared));

        let received = transfers.recv().await.unwrap();
        assert_eq!(received.status, TransferStatus::Cleared);
        assert!(worklist.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_blocked_goes_to_both_topics() {
        let bus = EventBus::default();
        let mut transfers = bus.subscribe_transfers();
        let mut worklist = bus.subscribe_worklist();

        bus.publish(event(TransferStatus::BlockedAml));

        assert_eq!(
            transfers.recv().await.unwrap().status,
            TransferStatus::BlockedAml
        );
        assert_eq!(
            worklist.recv().await.unwrap().status,
            TransferStatus::BlockedAml
        );
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_never_fails() {
        let bus = EventBus::default();
        bus.publish(event(TransferStatus::Cleared));
        bus.publish(event(TransferStatus::BlockedAml));
        assert_eq!(bus.published_count(), 2);
    }

    #[tokio::test]
    async fn test_dead_letter_counter() {
        let bus = EventBus::default();
        bus.dead_letter("ws-forwarder", "connection reset");
        assert_eq!(bus.dead_letter_count(), 1);
    }
}
