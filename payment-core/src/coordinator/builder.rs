use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use super::PaymentCoordinator;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::CoordinatorConfig;
use crate::gateway::Gateway;
use crate::idempotency::{IdempotencyEngine, IdempotencyStore};
use crate::locking::LockManager;
use crate::metrics::GatewayMetrics;
use crate::outbox::OutboxStore;
use crate::repository::Repository;
use crate::routing::Router;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuilderError {
    #[error("coordinator builder is missing a repository")]
    MissingRepository,
    #[error("coordinator builder is missing an outbox store")]
    MissingOutbox,
    #[error("coordinator builder is missing an idempotency store")]
    MissingIdempotencyStore,
    #[error("coordinator builder is missing a lock manager")]
    MissingLockManager,
    #[error("coordinator builder has no gateways registered")]
    NoGateways,
}

/// Assembles a [`PaymentCoordinator`] from its storage, locking, and
/// gateway dependencies (spec §9). Gateway registration feeds both the
/// coordinator's dispatch table and the router's circuit-breaker/metrics
/// bookkeeping in one call, so the two can never drift out of sync.
pub struct CoordinatorBuilder {
    repository: Option<Arc<dyn Repository>>,
    outbox: Option<Arc<dyn OutboxStore>>,
    idempotency_store: Option<Arc<dyn IdempotencyStore>>,
    lock_manager: Option<Arc<dyn LockManager>>,
    safety_fallback_gateway: Option<String>,
    gateways: HashMap<String, (Arc<dyn Gateway>, f64)>,
    config: CoordinatorConfig,
}

impl CoordinatorBuilder {
    pub fn new() -> Self {
        Self {
            repository: None,
            outbox: None,
            idempotency_store: None,
            lock_manager: None,
            safety_fallback_gateway: None,
            gateways: HashMap::new(),
            config: CoordinatorConfig::default(),
        }
    }

    pub fn repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn outbox_store(mut self, outbox: Arc<dyn OutboxStore>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn idempotency_store(mut self, store: Arc<dyn IdempotencyStore>) -> Self {
        self.idempotency_store = Some(store);
        self
    }

    pub fn lock_manager(mut self, lock_manager: Arc<dyn LockManager>) -> Self {
        self.lock_manager = Some(lock_manager);
        self
    }

    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a gateway under `name` with a static processing `cost`
    /// used by the router's scoring fallback (see DESIGN.md). The first
    /// gateway registered becomes the safety fallback unless
    /// [`Self::safety_fallback`] overrides it.
    pub fn register_gateway(mut self, name: impl Into<String>, gateway: Arc<dyn Gateway>, cost: f64) -> Self {
        let name = name.into();
        if self.safety_fallback_gateway.is_none() {
            self.safety_fallback_gateway = Some(name.clone());
        }
        self.gateways.insert(name, (gateway, cost));
        self
    }

    pub fn safety_fallback(mut self, name: impl Into<String>) -> Self {
        self.safety_fallback_gateway = Some(name.into());
        self
    }

    pub fn build(self) -> Result<PaymentCoordinator, BuilderError> {
        let repository = self.repository.ok_or(BuilderError::MissingRepository)?;
        let outbox = self.outbox.ok_or(BuilderError::MissingOutbox)?;
        let idempotency_store = self
            .idempotency_store
            .ok_or(BuilderError::MissingIdempotencyStore)?;
        let lock_manager = self.lock_manager.ok_or(BuilderError::MissingLockManager)?;
        if self.gateways.is_empty() {
            return Err(BuilderError::NoGateways);
        }
        let safety_fallback = self
            .safety_fallback_gateway
            .unwrap_or_else(|| self.gateways.keys().next().cloned().unwrap());

        let mut router = Router::new(self.config.routing.scoring_weights.clone(), safety_fallback);
        let mut gateways: HashMap<String, Arc<dyn Gateway>> = HashMap::new();
        for (name, (gateway, cost)) in self.gateways {
            router.register_gateway(
                name.clone(),
                Arc::new(CircuitBreaker::new(self.config.circuit_breaker.clone())),
                Arc::new(GatewayMetrics::new()),
                cost,
            );
            gateways.insert(name, gateway);
        }

        let idempotency = IdempotencyEngine::new(
            idempotency_store,
            Arc::clone(&lock_manager),
            self.config.idempotency.lock_timeout,
            self.config.idempotency.lock_timeout * self.config.idempotency.max_retries,
            self.config.idempotency.retry_interval,
            self.config.idempotency.ttl,
            self.config.idempotency.max_retries,
        );

        Ok(PaymentCoordinator {
            repository,
            outbox,
            idempotency,
            lock_manager,
            router,
            gateways,
            config: self.config,
        })
    }
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::FakeGateway;
    use crate::idempotency::InMemoryIdempotencyStore;
    use crate::locking::InMemoryLockManager;
    use crate::outbox::InMemoryOutboxStore;
    use crate::repository::InMemoryRepository;

    #[test]
    fn build_fails_without_gateways() {
        let err = CoordinatorBuilder::new()
            .repository(Arc::new(InMemoryRepository::new()))
            .outbox_store(Arc::new(InMemoryOutboxStore::new()))
            .idempotency_store(Arc::new(InMemoryIdempotencyStore::new()))
            .lock_manager(Arc::new(InMemoryLockManager::new()))
            .build()
            .unwrap_err();
        assert_eq!(err, BuilderError::NoGateways);
    }

    #[test]
    fn build_succeeds_with_every_dependency_present() {
        let coordinator = CoordinatorBuilder::new()
            .repository(Arc::new(InMemoryRepository::new()))
            .outbox_store(Arc::new(InMemoryOutboxStore::new()))
            .idempotency_store(Arc::new(InMemoryIdempotencyStore::new()))
            .lock_manager(Arc::new(InMemoryLockManager::new()))
            .register_gateway("stripe", Arc::new(FakeGateway::new("stripe")), 1.0)
            .build();
        assert!(coordinator.is_ok());
    }
}
