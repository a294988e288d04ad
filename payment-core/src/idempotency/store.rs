use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::record::IdempotencyRecord;
use crate::error::RepositoryError;

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, RepositoryError>;
    async fn put(&self, record: IdempotencyRecord) -> Result<(), RepositoryError>;
}

#[derive(Default)]
pub struct InMemoryIdempotencyStore {
    records: Mutex<HashMap<String, IdempotencyRecord>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, RepositoryError> {
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn put(&self, record: IdempotencyRecord) -> Result<(), RepositoryError> {
        self.records.lock().await.insert(record.key.clone(), record);
        Ok(())
    }
}
