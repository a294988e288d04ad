//! Crate-wide error taxonomy.
//!
//! Each subsystem defines its own narrow error enum close to where it is
//! raised (`StateMachineError`, `LockError`, `IdempotencyError`, ...);
//! `CoordinatorError` is the union the public `PaymentCoordinator` API
//! returns, so callers only ever match on one enum.

use thiserror::Error;

use crate::circuit_breaker::CircuitBreakerError;
use crate::domain::state_machine::StateMachineError;
use crate::idempotency::IdempotencyError;
use crate::locking::LockError;
use crate::routing::RouterError;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("gateway call failed: {message}")]
    Failed { message: String, retryable: bool },
}

impl GatewayError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Failed { retryable, .. } => *retryable,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Failed { message, .. } => message,
        }
    }
}

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("payment not found: {0}")]
    NotFound(String),
    #[error("duplicate idempotency key: {0}")]
    DuplicateIdempotencyKey(String),
    #[error("optimistic lock conflict on payment {id} (expected version {expected})")]
    OptimisticLock { id: String, expected: i64 },
    #[error("storage error: {0}")]
    Storage(String),
}

/// The error surface of `PaymentCoordinator::create_payment` and
/// `::process_payment`. Every subsystem error the coordinator can
/// encounter is represented here exactly once.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Idempotency(#[from] IdempotencyError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("circuit open for gateway {gateway} (health score {health_score:.2})")]
    CircuitOpen { gateway: String, health_score: f64 },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl From<CircuitBreakerError> for CoordinatorError {
    fn from(e: CircuitBreakerError) -> Self {
        match e {
            CircuitBreakerError::Open { gateway, health_score } => {
                Self::CircuitOpen { gateway, health_score }
            }
            CircuitBreakerError::Gateway(inner) => Self::Gateway(inner),
        }
    }
}

#[derive(Error, Debug)]
#[error("outbox publish error: {0}")]
pub struct OutboxPublishError(pub String);
