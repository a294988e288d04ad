use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::PaymentEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Processing,
    Published,
    Failed,
}

/// A row written in the same transaction as the `Payment` state change it
/// describes (spec §4.3). `OutboxPublisher` is the only thing that ever
/// transitions `status` away from `Pending`. `next_retry_at` gates
/// `getPending`: a row only becomes eligible again once this timestamp has
/// passed, so a backed-off retry doesn't spin the poll loop.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub event: PaymentEvent,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub next_retry_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl OutboxEntry {
    pub fn new(event: PaymentEvent) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            event,
            status: OutboxStatus::Pending,
            created_at: now,
            processed_at: None,
            next_retry_at: now,
            attempts: 0,
            last_error: None,
        }
    }

    /// Atomic claim: moves `Pending` to `Processing` so two concurrent
    /// pollers can't publish the same row. Returns `false` (no-op) if the
    /// row wasn't `Pending`.
    pub fn mark_processing(&mut self) -> bool {
        if self.status != OutboxStatus::Pending {
            return false;
        }
        self.status = OutboxStatus::Processing;
        true
    }

    pub fn mark_published(&mut self) {
        self.status = OutboxStatus::Published;
        self.processed_at = Some(Utc::now());
        self.attempts += 1;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = OutboxStatus::Failed;
        self.processed_at = Some(Utc::now());
        self.attempts += 1;
        self.last_error = Some(error.into());
    }

    /// Reverts a claimed row back to `Pending` after a transient failure,
    /// scheduled not to be picked up again until `next_retry_at`.
    pub fn schedule_retry(&mut self, error: impl Into<String>, next_retry_at: DateTime<Utc>) {
        self.status = OutboxStatus::Pending;
        self.attempts += 1;
        self.last_error = Some(error.into());
        self.next_retry_at = next_retry_at;
    }
}
