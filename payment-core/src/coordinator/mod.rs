//! The public orchestration surface (spec §4.8): `create_payment` wraps
//! aggregate construction in the idempotency engine, `process_payment`
//! drives a payment through authentication and processing against a
//! routed gateway with retry, circuit-breaking, and outbox publication.

pub mod builder;
pub mod request;

use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

pub use builder::CoordinatorBuilder;
pub use request::CreatePaymentRequest;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use crate::config::{CoordinatorConfig, RetryConfig};
use crate::domain::{EventType, Payment, PaymentEvent, PaymentId};
use crate::error::{CoordinatorError, GatewayError, RepositoryError};
use crate::gateway::Gateway;
use crate::idempotency::IdempotencyEngine;
use crate::locking::LockManager;
use crate::outbox::{OutboxEntry, OutboxStore};
use crate::repository::Repository;
use crate::routing::{Router, RoutingContext};
use crate::validation::validate_create_payment;
use common::ScopedKey;

pub struct PaymentCoordinator {
    repository: Arc<dyn Repository>,
    outbox: Arc<dyn OutboxStore>,
    idempotency: IdempotencyEngine,
    lock_manager: Arc<dyn LockManager>,
    router: Router,
    gateways: std::collections::HashMap<String, Arc<dyn Gateway>>,
    config: CoordinatorConfig,
}

impl PaymentCoordinator {
    #[instrument(skip(self, request))]
    pub async fn create_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<Payment, CoordinatorError> {
        validate_create_payment(
            &request.idempotency_key,
            &request.amount,
            &request.customer,
            &request.payment_method,
            &request.metadata,
        )?;

        let scoped_key = ScopedKey::new(
            &request.merchant_id,
            "create_payment",
            &request.idempotency_key,
        );
        let body = json!({
            "amount": request.amount.amount().to_string(),
            "currency": request.amount.currency().code(),
            "payment_method": request.payment_method,
            "customer": request.customer,
        });

        let repository = Arc::clone(&self.repository);
        let outbox = Arc::clone(&self.outbox);
        let idempotency_key = request.idempotency_key.clone();
        let amount = request.amount;
        let payment_method = request.payment_method.clone();
        let customer = request.customer.clone();
        let metadata = request.metadata.clone();

        let response = self
            .idempotency
            .execute(scoped_key.as_str(), &body, move || async move {
                let payment = Payment::new(idempotency_key, amount, payment_method, customer, metadata);
                repository
                    .save(&payment)
                    .await
                    .map_err(|e| e.to_string())?;

                let event = PaymentEvent::new(
                    payment.id(),
                    EventType::PaymentInitiated,
                    payment.version(),
                    serde_json::to_value(&payment).map_err(|e| e.to_string())?,
                    None,
                );
                outbox
                    .write(OutboxEntry::new(event))
                    .await
                    .map_err(|e| e.to_string())?;

                serde_json::to_value(&payment).map_err(|e| e.to_string())
            })
            .await?;

        Ok(serde_json::from_value(response).expect("coordinator only ever caches Payment JSON"))
    }

    /// Processes a payment, routing it via the adaptive router unless
    /// `gateway_type` is given, in which case that gateway is used
    /// directly (spec §4.8 step 4: "use `request.gatewayType` if
    /// provided else call Router").
    #[instrument(skip(self))]
    pub async fn process_payment(
        &self,
        payment_id: PaymentId,
        gateway_type: Option<String>,
    ) -> Result<Payment, CoordinatorError> {
        let payment = self
            .repository
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(payment_id.to_string()))?;

        if payment.is_terminal() {
            return Ok(payment);
        }

        let lock_key = format!("payment:{payment_id}");
        let owner = uuid::Uuid::new_v4().to_string();

        crate::locking::with_lock(
            self.lock_manager.as_ref(),
            &lock_key,
            &owner,
            self.config.idempotency.lock_timeout,
            self.config.idempotency.lock_timeout * 2,
            self.config.idempotency.retry_interval,
            || self.process_locked(payment_id, gateway_type),
        )
        .await
    }

    async fn process_locked(
        &self,
        payment_id: PaymentId,
        gateway_type: Option<String>,
    ) -> Result<Payment, CoordinatorError> {
        let mut payment = self
            .repository
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(payment_id.to_string()))?;

        if payment.is_terminal() {
            return Ok(payment);
        }

        let gateway_name = match gateway_type {
            Some(name) => name,
            None => {
                let ctx = RoutingContext {
                    amount: payment.amount(),
                    payment_method_kind: payment_method_kind(&payment),
                    billing_country: payment.customer().billing_country.clone(),
                };
                self.router.route(&ctx)?.gateway
            }
        };
        let gateway = self
            .gateways
            .get(&gateway_name)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("no gateway registered for {gateway_name}")))?;
        let breaker = self
            .router
            .breaker(&gateway_name)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("no gateway registered for {gateway_name}")))?;
        let metrics = self.router.metrics(&gateway_name).cloned();

        let expected_version = payment.version();
        let auth_result = self
            .gated_call(&breaker, &gateway_name, &self.config.retry, || {
                gateway.authenticate(&payment)
            })
            .await;

        let auth_ref = match auth_result {
            Ok(r) => r,
            Err(CoordinatorError::Gateway(e)) => {
                return self
                    .finish_as_failure(&mut payment, expected_version, &gateway_name, e)
                    .await
            }
            Err(e) => return Err(e),
        };
        info!(gateway = %gateway_name, auth_ref = %auth_ref, "payment authenticated");

        payment.authenticate(gateway_name.clone())?;
        self.persist_transition(&mut payment, expected_version, EventType::PaymentAuthenticated)
            .await?;

        let expected_version = payment.version();
        let start = Instant::now();
        let process_result = self
            .gated_call(&breaker, &gateway_name, &self.config.retry, || gateway.process(&payment))
            .await;

        match process_result {
            Ok(gateway_transaction_id) => {
                if let Some(m) = &metrics {
                    m.record(true, start.elapsed());
                }
                payment.start_processing(gateway_transaction_id)?;
                self.persist_transition(&mut payment, expected_version, EventType::PaymentProcessing)
                    .await?;

                let expected_version = payment.version();
                payment.succeed()?;
                self.persist_transition(&mut payment, expected_version, EventType::PaymentSucceeded)
                    .await?;
                Ok(payment)
            }
            Err(CoordinatorError::Gateway(e)) => {
                if let Some(m) = &metrics {
                    m.record(false, start.elapsed());
                }
                self.finish_as_failure(&mut payment, expected_version, &gateway_name, e)
                    .await
            }
            Err(e) => Err(e),
        }
    }

    async fn finish_as_failure(
        &self,
        payment: &mut Payment,
        expected_version: i64,
        gateway_name: &str,
        error: GatewayError,
    ) -> Result<Payment, CoordinatorError> {
        warn!(gateway = %gateway_name, error = %error.message(), "payment failed");
        payment.fail(error.message().to_string())?;
        self.persist_transition(payment, expected_version, EventType::PaymentFailed)
            .await?;
        Ok(payment.clone())
    }

    async fn persist_transition(
        &self,
        payment: &mut Payment,
        expected_version: i64,
        event_type: EventType,
    ) -> Result<(), CoordinatorError> {
        self.repository
            .update_with_version(payment, expected_version)
            .await?;

        let event = PaymentEvent::new(
            payment.id(),
            event_type,
            payment.version(),
            serde_json::to_value(&*payment).unwrap_or(serde_json::Value::Null),
            None,
        );
        self.outbox.write(OutboxEntry::new(event)).await?;
        Ok(())
    }

    /// Retries a gateway call according to `retry`, with every attempt
    /// gated through the circuit breaker (spec §4.5, §4.8): an `OPEN`
    /// breaker rejects with [`CoordinatorError::CircuitOpen`] before any
    /// call is attempted, and a gateway failure is retried with
    /// full-jitter backoff until it stops being retryable or the retry
    /// budget is exhausted.
    async fn gated_call<F, Fut, T>(
        &self,
        breaker: &Arc<CircuitBreaker>,
        gateway_name: &str,
        retry: &RetryConfig,
        f: F,
    ) -> Result<T, CoordinatorError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut attempt = 0;
        loop {
            match breaker.execute(gateway_name, || f()).await {
                Ok(value) => return Ok(value),
                Err(CircuitBreakerError::Open { gateway, health_score }) => {
                    return Err(CoordinatorError::CircuitOpen { gateway, health_score })
                }
                Err(CircuitBreakerError::Gateway(e))
                    if e.is_retryable() && attempt < retry.max_retries =>
                {
                    attempt += 1;
                    let delay = crate::backoff::jittered_delay(
                        attempt,
                        retry.initial_delay,
                        retry.max_delay,
                        retry.backoff_multiplier,
                        retry.jitter_factor,
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(CircuitBreakerError::Gateway(e)) => return Err(CoordinatorError::Gateway(e)),
            }
        }
    }
}

fn payment_method_kind(payment: &Payment) -> String {
    use crate::domain::PaymentMethod::*;
    match payment.payment_method() {
        Card { .. } => "card",
        Upi { .. } => "upi",
        NetBanking { .. } => "net_banking",
        Wallet { .. } => "wallet",
        PayLater { .. } => "pay_later",
    }
    .to_string()
}
