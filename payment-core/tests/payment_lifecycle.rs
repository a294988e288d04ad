use async_trait::async_trait;
use common::{Currency, Money};
use mockall::mock;
use payment_core::config::{CircuitBreakerConfig, CoordinatorConfig, RetryConfig};
use payment_core::coordinator::CoordinatorBuilder;
use payment_core::domain::{Customer, PaymentMethod, PaymentState};
use payment_core::error::{CoordinatorError, GatewayError};
use payment_core::gateway::Gateway;
use payment_core::idempotency::InMemoryIdempotencyStore;
use payment_core::locking::InMemoryLockManager;
use payment_core::outbox::InMemoryOutboxStore;
use payment_core::repository::InMemoryRepository;
use payment_core::coordinator::CreatePaymentRequest;
use payment_core::domain::Payment;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

mock! {
    pub GatewayImpl {}

    #[async_trait]
    impl Gateway for GatewayImpl {
        fn name(&self) -> &str;
        async fn authenticate(&self, payment: &Payment) -> Result<String, GatewayError>;
        async fn process(&self, payment: &Payment) -> Result<String, GatewayError>;
    }
}

fn request(key: &str) -> CreatePaymentRequest {
    CreatePaymentRequest {
        merchant_id: "merchant_1".to_string(),
        idempotency_key: key.to_string(),
        amount: Money::new(dec!(150), Currency::USD).unwrap(),
        payment_method: PaymentMethod::Card {
            card_number: "4111111111111111".to_string(),
            expiry_month: 12,
            expiry_year: 2030,
        },
        customer: Customer {
            id: "cust_1".to_string(),
            email: "buyer@example.com".to_string(),
            phone: None,
            billing_country: Some("US".to_string()),
        },
        metadata: HashMap::new(),
    }
}

/// S1: a gateway that always succeeds drives a payment from INITIATED
/// all the way to SUCCESS, with each intermediate state persisted.
#[tokio::test]
async fn happy_path_reaches_success() {
    let mut gateway = MockGatewayImpl::new();
    gateway.expect_name().return_const("acme_gw".to_string());
    gateway
        .expect_authenticate()
        .times(1)
        .returning(|p| Ok(format!("auth_{}", p.id())));
    gateway
        .expect_process()
        .times(1)
        .returning(|p| Ok(format!("txn_{}", p.id())));

    let coordinator = CoordinatorBuilder::new()
        .repository(Arc::new(InMemoryRepository::new()))
        .outbox_store(Arc::new(InMemoryOutboxStore::new()))
        .idempotency_store(Arc::new(InMemoryIdempotencyStore::new()))
        .lock_manager(Arc::new(InMemoryLockManager::new()))
        .register_gateway("acme_gw", Arc::new(gateway), 1.0)
        .build()
        .unwrap();

    let created = coordinator.create_payment(request("s1")).await.unwrap();
    assert_eq!(created.state(), PaymentState::Initiated);

    let done = coordinator.process_payment(created.id(), None).await.unwrap();
    assert_eq!(done.state(), PaymentState::Success);
    assert!(done.gateway_transaction_id().unwrap().starts_with("txn_"));
}

/// S2: a non-retryable gateway failure (e.g. card declined) moves the
/// payment straight to FAILURE without burning a retry budget.
#[tokio::test]
async fn non_retryable_gateway_failure_goes_straight_to_failure() {
    let mut gateway = MockGatewayImpl::new();
    gateway.expect_name().return_const("acme_gw".to_string());
    gateway
        .expect_authenticate()
        .times(1)
        .returning(|p| Ok(format!("auth_{}", p.id())));
    gateway
        .expect_process()
        .times(1)
        .returning(|_| Err(GatewayError::non_retryable("card declined")));

    let coordinator = CoordinatorBuilder::new()
        .repository(Arc::new(InMemoryRepository::new()))
        .outbox_store(Arc::new(InMemoryOutboxStore::new()))
        .idempotency_store(Arc::new(InMemoryIdempotencyStore::new()))
        .lock_manager(Arc::new(InMemoryLockManager::new()))
        .register_gateway("acme_gw", Arc::new(gateway), 1.0)
        .build()
        .unwrap();

    let created = coordinator.create_payment(request("s2")).await.unwrap();
    let done = coordinator.process_payment(created.id(), None).await.unwrap();
    assert_eq!(done.state(), PaymentState::Failure);
    assert_eq!(done.failure_reason(), Some("card declined"));
}

/// S3: a retryable failure that recovers on a later attempt succeeds
/// without surfacing an error to the caller.
#[tokio::test]
async fn transient_failure_recovers_within_the_retry_budget() {
    let mut gateway = MockGatewayImpl::new();
    gateway.expect_name().return_const("acme_gw".to_string());
    gateway
        .expect_authenticate()
        .returning(|p| Ok(format!("auth_{}", p.id())));

    let calls = Arc::new(AtomicU32::new(0));
    let calls2 = Arc::clone(&calls);
    gateway.expect_process().times(3).returning(move |p| {
        let n = calls2.fetch_add(1, Ordering::SeqCst);
        if n < 2 {
            Err(GatewayError::retryable("upstream timeout"))
        } else {
            Ok(format!("txn_{}", p.id()))
        }
    });

    let mut config = CoordinatorConfig::default();
    config.retry = RetryConfig {
        max_retries: 5,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 1.5,
        jitter_factor: 0.0,
    };

    let coordinator = CoordinatorBuilder::new()
        .repository(Arc::new(InMemoryRepository::new()))
        .outbox_store(Arc::new(InMemoryOutboxStore::new()))
        .idempotency_store(Arc::new(InMemoryIdempotencyStore::new()))
        .lock_manager(Arc::new(InMemoryLockManager::new()))
        .register_gateway("acme_gw", Arc::new(gateway), 1.0)
        .config(config)
        .build()
        .unwrap();

    let created = coordinator.create_payment(request("s3")).await.unwrap();
    let done = coordinator.process_payment(created.id(), None).await.unwrap();
    assert_eq!(done.state(), PaymentState::Success);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

/// S4: repeated failures past the circuit breaker's threshold open the
/// circuit and a subsequent call is rejected before reaching the gateway.
#[tokio::test]
async fn repeated_failures_open_the_circuit_for_subsequent_requests() {
    let mut gateway = MockGatewayImpl::new();
    gateway.expect_name().return_const("acme_gw".to_string());
    gateway
        .expect_authenticate()
        .returning(|p| Ok(format!("auth_{}", p.id())));
    gateway
        .expect_process()
        .returning(|_| Err(GatewayError::non_retryable("processor down")));

    let mut config = CoordinatorConfig::default();
    config.circuit_breaker = CircuitBreakerConfig {
        failure_threshold: 2,
        failure_rate_threshold: 0.99,
        success_threshold: 2,
        open_timeout: Duration::from_secs(60),
        half_open_timeout: Duration::from_secs(30),
        half_open_max_attempts: 1,
        min_health_score: 0.5,
        failure_rate_window: Duration::from_secs(300),
    };

    let repository = Arc::new(InMemoryRepository::new());
    let coordinator = CoordinatorBuilder::new()
        .repository(repository.clone())
        .outbox_store(Arc::new(InMemoryOutboxStore::new()))
        .idempotency_store(Arc::new(InMemoryIdempotencyStore::new()))
        .lock_manager(Arc::new(InMemoryLockManager::new()))
        .register_gateway("acme_gw", Arc::new(gateway), 1.0)
        .safety_fallback("acme_gw")
        .config(config)
        .build()
        .unwrap();

    for key in ["s4-a", "s4-b"] {
        let created = coordinator.create_payment(request(key)).await.unwrap();
        let done = coordinator.process_payment(created.id(), None).await.unwrap();
        assert_eq!(done.state(), PaymentState::Failure);
    }

    let created = coordinator.create_payment(request("s4-c")).await.unwrap();
    let result = coordinator.process_payment(created.id(), None).await;
    assert!(matches!(result, Err(CoordinatorError::CircuitOpen { .. })));
}

/// S5: a caller that names `gatewayType` explicitly bypasses the router
/// entirely, even when a different gateway would otherwise be selected.
#[tokio::test]
async fn process_payment_honors_an_explicit_gateway_override() {
    let mut scored_higher = MockGatewayImpl::new();
    scored_higher.expect_name().return_const("preferred_gw".to_string());
    scored_higher
        .expect_authenticate()
        .returning(|p| Ok(format!("auth_{}", p.id())));
    scored_higher
        .expect_process()
        .returning(|p| Ok(format!("txn_{}", p.id())));

    let mut pinned = MockGatewayImpl::new();
    pinned.expect_name().return_const("pinned_gw".to_string());
    pinned
        .expect_authenticate()
        .times(1)
        .returning(|p| Ok(format!("auth_{}", p.id())));
    pinned
        .expect_process()
        .times(1)
        .returning(|p| Ok(format!("txn_{}", p.id())));

    let coordinator = CoordinatorBuilder::new()
        .repository(Arc::new(InMemoryRepository::new()))
        .outbox_store(Arc::new(InMemoryOutboxStore::new()))
        .idempotency_store(Arc::new(InMemoryIdempotencyStore::new()))
        .lock_manager(Arc::new(InMemoryLockManager::new()))
        .register_gateway("preferred_gw", Arc::new(scored_higher), 1.0)
        .register_gateway("pinned_gw", Arc::new(pinned), 1.0)
        .build()
        .unwrap();

    let created = coordinator.create_payment(request("s5")).await.unwrap();
    let done = coordinator
        .process_payment(created.id(), Some("pinned_gw".to_string()))
        .await
        .unwrap();
    assert_eq!(done.state(), PaymentState::Success);
    assert_eq!(done.gateway().as_deref(), Some("pinned_gw"));
}
