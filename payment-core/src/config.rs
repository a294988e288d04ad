//! The named configuration surface (spec §6): one struct per subsystem,
//! each with a `Default` matching the stated defaults, assembled into a
//! single `CoordinatorConfig`.

use std::time::Duration;

/// Retry policy used when calling out to a gateway.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            jitter_factor: 1.0,
        }
    }
}

/// Circuit breaker thresholds, one set applied per gateway.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub failure_rate_threshold: f64,
    pub success_threshold: u32,
    pub open_timeout: Duration,
    pub half_open_timeout: Duration,
    pub half_open_max_attempts: u32,
    pub min_health_score: f64,
    pub failure_rate_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_rate_threshold: 0.5,
            success_threshold: 3,
            open_timeout: Duration::from_secs(60),
            half_open_timeout: Duration::from_secs(30),
            half_open_max_attempts: 5,
            min_health_score: 0.5,
            failure_rate_window: Duration::from_secs(5 * 60),
        }
    }
}

/// Routing weights for the scoring fallback when no rule matches.
#[derive(Debug, Clone)]
pub struct ScoringWeights {
    pub success_rate: f64,
    pub latency: f64,
    pub cost: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            success_rate: 0.5,
            latency: 0.3,
            cost: 0.2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoutingConfig {
    pub scoring_weights: ScoringWeights,
}

/// Outbox publisher cadence and retention.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub enable_cleanup: bool,
    pub cleanup_age: Duration,
    pub cleanup_interval: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1000),
            batch_size: 50,
            max_retries: 8,
            retry_base_delay: Duration::from_millis(500),
            retry_max_delay: Duration::from_secs(60),
            enable_cleanup: true,
            cleanup_age: Duration::from_secs(7 * 24 * 60 * 60),
            cleanup_interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Idempotency window and in-flight polling behavior.
#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    pub ttl: Duration,
    pub lock_timeout: Duration,
    pub retry_interval: Duration,
    pub max_retries: u32,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            lock_timeout: Duration::from_secs(5),
            retry_interval: Duration::from_millis(200),
            max_retries: 25,
        }
    }
}

/// The full configuration surface passed to `CoordinatorBuilder`.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub routing: RoutingConfig,
    pub outbox: OutboxConfig,
    pub idempotency: IdempotencyConfig,
}
