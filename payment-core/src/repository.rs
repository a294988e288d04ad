//! Persistence contract for the `Payment` aggregate (spec §6). No concrete
//! storage engine is in scope — callers bring their own `Repository` plus
//! an `OutboxStore` (see [`crate::outbox`]) backed by the same database so
//! the two can share a transaction.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::domain::{Payment, PaymentId};
use crate::error::RepositoryError;

#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_by_id(&self, id: PaymentId) -> Result<Option<Payment>, RepositoryError>;

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Payment>, RepositoryError>;

    async fn find_by_gateway_transaction_id(
        &self,
        gateway_transaction_id: &str,
    ) -> Result<Option<Payment>, RepositoryError>;

    async fn save(&self, payment: &Payment) -> Result<(), RepositoryError>;

    /// Optimistic-concurrency update: succeeds only if the stored row's
    /// version still equals `expected_version`, otherwise returns
    /// `RepositoryError::OptimisticLock`.
    async fn update_with_version(
        &self,
        payment: &Payment,
        expected_version: i64,
    ) -> Result<(), RepositoryError>;
}

/// A reference implementation for tests and examples. Not suitable for
/// production: `update_with_version` races are only serialized by the
/// process-wide mutex, not by any durable storage engine.
#[derive(Default)]
pub struct InMemoryRepository {
    by_id: Mutex<HashMap<PaymentId, Payment>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_by_id(&self, id: PaymentId) -> Result<Option<Payment>, RepositoryError> {
        Ok(self.by_id.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<Payment>, RepositoryError> {
        Ok(self
            .by_id
            .lock()
            .unwrap()
            .values()
            .find(|p| p.idempotency_key() == key)
            .cloned())
    }

    async fn find_by_gateway_transaction_id(
        &self,
        gateway_transaction_id: &str,
    ) -> Result<Option<Payment>, RepositoryError> {
        Ok(self
            .by_id
            .lock()
            .unwrap()
            .values()
            .find(|p| p.gateway_transaction_id() == Some(gateway_transaction_id))
            .cloned())
    }

    async fn save(&self, payment: &Payment) -> Result<(), RepositoryError> {
        let mut store = self.by_id.lock().unwrap();
        if store.contains_key(&payment.id()) {
            return Err(RepositoryError::DuplicateIdempotencyKey(
                payment.idempotency_key().to_string(),
            ));
        }
        store.insert(payment.id(), payment.clone());
        Ok(())
    }

    async fn update_with_version(
        &self,
        payment: &Payment,
        expected_version: i64,
    ) -> Result<(), RepositoryError> {
        let mut store = self.by_id.lock().unwrap();
        let current = store
            .get(&payment.id())
            .ok_or_else(|| RepositoryError::NotFound(payment.id().to_string()))?;

        if current.version() != expected_version {
            return Err(RepositoryError::OptimisticLock {
                id: payment.id().to_string(),
                expected: expected_version,
            });
        }

        store.insert(payment.id(), payment.clone());
        Ok(())
    }
}
