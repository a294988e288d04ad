use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::payment::PaymentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EventType {
    PaymentInitiated,
    PaymentAuthenticated,
    PaymentProcessing,
    PaymentSucceeded,
    PaymentFailed,
}

/// The immutable audit/notification record (spec §3). `version` is the
/// dense per-aggregate sequence number; it is assigned by the coordinator
/// as `payment.version()` right after the transition it describes, so it
/// always matches the version stored on the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub event_id: Uuid,
    pub aggregate_id: PaymentId,
    pub event_type: EventType,
    pub version: i64,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub correlation_id: Option<Uuid>,
}

impl PaymentEvent {
    pub fn new(
        aggregate_id: PaymentId,
        event_type: EventType,
        version: i64,
        payload: serde_json::Value,
        correlation_id: Option<Uuid>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            aggregate_id,
            event_type,
            version,
            timestamp: Utc::now(),
            payload,
            correlation_id,
        }
    }
}
