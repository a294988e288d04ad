use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use uuid::Uuid;

use super::entry::{OutboxEntry, OutboxStatus};
use crate::error::RepositoryError;

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Should be called in the same transaction as the `Payment` write it
    /// accompanies; left to the caller since this crate owns no connection.
    async fn write(&self, entry: OutboxEntry) -> Result<(), RepositoryError>;

    /// Rows with `status == Pending` and `next_retry_at <= now`, ordered
    /// by `created_at`, capped at `limit`.
    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, RepositoryError>;

    /// Atomic test-and-set: claims a `Pending` row by moving it to
    /// `Processing`. Returns `false` if the row was not `Pending` (already
    /// claimed by another poller, or not found).
    async fn mark_processing(&self, id: Uuid) -> Result<bool, RepositoryError>;

    async fn mark_published(&self, id: Uuid) -> Result<(), RepositoryError>;

    /// Permanently marks an entry as failed (publisher has given up after
    /// exhausting its retry budget).
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), RepositoryError>;

    /// Reverts a claimed entry back to `Pending`, scheduled not to be
    /// retried until `next_retry_at`. Returns the resulting attempt count.
    async fn schedule_retry(
        &self,
        id: Uuid,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<u32, RepositoryError>;

    /// Deletes published rows older than `older_than`. Returns the count
    /// removed.
    async fn cleanup_published_older_than(
        &self,
        older_than: chrono::Duration,
    ) -> Result<u64, RepositoryError>;
}

#[derive(Default)]
pub struct InMemoryOutboxStore {
    entries: Mutex<Vec<OutboxEntry>>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn write(&self, entry: OutboxEntry) -> Result<(), RepositoryError> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    async fn fetch_pending(&self, limit: usize) -> Result<Vec<OutboxEntry>, RepositoryError> {
        let now = Utc::now();
        let mut pending: Vec<OutboxEntry> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.status == OutboxStatus::Pending && e.next_retry_at <= now)
            .cloned()
            .collect();
        pending.sort_by_key(|e| e.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_processing(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        Ok(entry.mark_processing())
    }

    async fn mark_published(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        entry.mark_published();
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), RepositoryError> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        entry.mark_failed(error);
        Ok(())
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        error: &str,
        next_retry_at: DateTime<Utc>,
    ) -> Result<u32, RepositoryError> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        entry.schedule_retry(error, next_retry_at);
        Ok(entry.attempts)
    }

    async fn cleanup_published_older_than(
        &self,
        older_than: chrono::Duration,
    ) -> Result<u64, RepositoryError> {
        let cutoff = chrono::Utc::now() - older_than;
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| {
            !(e.status == OutboxStatus::Published
                && e.processed_at.map(|t| t < cutoff).unwrap_or(false))
        });
        Ok((before - entries.len()) as u64)
    }
}
