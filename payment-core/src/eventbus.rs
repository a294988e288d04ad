//! The notification sink the outbox publisher drains into. A thin trait so
//! a Kafka/SNS/webhook implementation slots in without touching
//! `OutboxPublisher` itself.

use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;
use tracing::info;

use crate::domain::PaymentEvent;

#[derive(Error, Debug)]
#[error("event bus publish failed: {0}")]
pub struct EventBusError(pub String);

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: &PaymentEvent) -> Result<(), EventBusError>;
}

/// Retains every published event for assertions in tests; logs the rest.
#[derive(Default)]
pub struct InMemoryEventBus {
    published: Mutex<Vec<PaymentEvent>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<PaymentEvent> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: &PaymentEvent) -> Result<(), EventBusError> {
        info!(
            event_type = ?event.event_type,
            aggregate_id = %event.aggregate_id,
            version = event.version,
            "publishing payment event"
        );
        self.published.lock().unwrap().push(event.clone());
        Ok(())
    }
}
