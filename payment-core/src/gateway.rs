//! The payment-processor boundary. `PaymentCoordinator` never talks to a
//! real gateway SDK directly — it only ever sees this trait, so swapping
//! Stripe for Adyen is an infrastructure-layer change, not a core one.

use async_trait::async_trait;
use tracing::info;

use crate::domain::Payment;
use crate::error::GatewayError;

#[async_trait]
pub trait Gateway: Send + Sync {
    fn name(&self) -> &str;

    /// Establishes the gateway-side session/authorization for the payment.
    /// Returns an opaque gateway reference.
    async fn authenticate(&self, payment: &Payment) -> Result<String, GatewayError>;

    /// Attempts the charge. Returns the gateway's transaction id on
    /// success. Failures must be tagged retryable/non-retryable correctly
    /// — the coordinator's retry loop and circuit breaker both depend on
    /// that distinction.
    async fn process(&self, payment: &Payment) -> Result<String, GatewayError>;
}

/// A deterministic always-succeeds gateway for tests and local
/// development, standing in for a real SDK integration the way a test
/// double mocks an external dependency.
pub struct FakeGateway {
    name: String,
}

impl FakeGateway {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Gateway for FakeGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn authenticate(&self, payment: &Payment) -> Result<String, GatewayError> {
        info!(gateway = %self.name, payment_id = %payment.id(), "authenticating payment");
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        Ok(format!("auth_{}", payment.id()))
    }

    async fn process(&self, payment: &Payment) -> Result<String, GatewayError> {
        info!(gateway = %self.name, payment_id = %payment.id(), "processing payment");
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        Ok(format!("txn_{}", payment.id()))
    }
}
