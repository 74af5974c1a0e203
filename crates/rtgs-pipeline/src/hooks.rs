//! Post-commit event publication
//!
//! Adapts the payment engine's post-commit seam onto the broadcast bus.

use std::sync::Arc;

use async_trait::async_trait;

use rtgs_events::EventBus;
use rtgs_payments::PostCommitHook;
use rtgs_types::TransferEvent;

/// Publishes committed transfers to the fan-out topics
pub struct EventBusHook {
    bus: Arc<EventBus>,
}

impl EventBusHook {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl PostCommitHook for EventBusHook {
    async fn transfer_committed(&self, event: TransferEvent) {
        self.bus.publish(event);
    }
}
