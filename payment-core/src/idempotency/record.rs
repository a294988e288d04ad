use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdempotencyState {
    Processing,
    Completed,
    Failed,
}

/// One row per idempotency key (spec §3). `fingerprint` is the SHA-256 of
/// the canonical-JSON request body; a second request under the same key
/// with a different fingerprint is a client bug, not a retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub fingerprint: String,
    pub state: IdempotencyState,
    pub response: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn processing(key: String, fingerprint: String) -> Self {
        let now = Utc::now();
        Self {
            key,
            fingerprint,
            state: IdempotencyState::Processing,
            response: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_completed(&mut self, response: serde_json::Value) {
        self.state = IdempotencyState::Completed;
        self.response = Some(response);
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.state = IdempotencyState::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }

    pub fn is_expired(&self, ttl: std::time::Duration) -> bool {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::max_value());
        Utc::now() - self.created_at > ttl
    }
}
