//! Payment orchestration reliability core.
//!
//! A state-machine-driven coordinator: it accepts payment requests, routes
//! them to one of several external payment gateways, survives gateway
//! failures, and delivers lifecycle events to downstream consumers with
//! at-least-once guarantees while preventing duplicate side effects.
//!
//! # Modules
//!
//! * `domain` — the `Payment` aggregate, its events, and the state machine.
//! * `locking` — named mutual-exclusion leases used to serialize per-aggregate work.
//! * `idempotency` — request fingerprinting and in-flight de-duplication.
//! * `circuit_breaker` — per-gateway failure isolation.
//! * `metrics` — rolling gateway health/latency tracking.
//! * `routing` — gateway selection by rules and weighted scoring.
//! * `outbox` — the durable event queue and its background publisher.
//! * `coordinator` — orchestrates the above for `create`/`process` operations.
//! * `repository` — the persistence contract the coordinator depends on.
//! * `gateway` — the external payment gateway contract.
//! * `eventbus` — the external event bus contract the publisher depends on.
//! * `config` — the named configuration surface for every subsystem.
//! * `error` — the crate-wide error taxonomy.
//! * `validation` — `createPayment` input validation.
//! * `backoff` — shared jittered exponential backoff helper.

pub mod backoff;
pub mod circuit_breaker;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod eventbus;
pub mod gateway;
pub mod idempotency;
pub mod locking;
pub mod metrics;
pub mod outbox;
pub mod repository;
pub mod routing;
pub mod validation;

pub use coordinator::{CoordinatorBuilder, PaymentCoordinator};
pub use error::CoordinatorError;
