//! Per-gateway circuit breaker (spec §4.5). Three states — `CLOSED`,
//! `OPEN`, `HALF_OPEN` — gate whether a call is attempted at all; a
//! separate health score feeds the router's eligibility check independent
//! of the breaker's own state.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::config::CircuitBreakerConfig;
use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// The error surface of [`CircuitBreaker::execute`]: either the breaker
/// rejected the call outright, or the call ran and failed on its own.
#[derive(Error, Debug)]
pub enum CircuitBreakerError {
    #[error("circuit open for gateway {gateway} (health score {health_score:.2})")]
    Open { gateway: String, health_score: f64 },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl CircuitBreakerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Open { .. } => false,
            Self::Gateway(e) => e.is_retryable(),
        }
    }
}

struct Outcome {
    at: Instant,
    success: bool,
}

struct Inner {
    state: CircuitState,
    window: VecDeque<Outcome>,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    half_open_entered_at: Option<Instant>,
    half_open_attempts: u32,
}

/// One breaker instance per gateway. Thread-safe via an internal mutex so
/// it can be shared behind an `Arc` across coordinator tasks.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window: VecDeque::new(),
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: None,
                half_open_entered_at: None,
                half_open_attempts: 0,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Whether a call should be attempted right now. Has side effects: it
    /// advances `OPEN` -> `HALF_OPEN` once `open_timeout` elapses, and
    /// reverts a stalled `HALF_OPEN` probe back to `OPEN`.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = inner.opened_at.map(|t| now.duration_since(t));
                if elapsed.is_some_and(|e| e >= self.config.open_timeout) {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_entered_at = Some(now);
                    inner.half_open_attempts = 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                let stalled = inner
                    .half_open_entered_at
                    .map(|t| now.duration_since(t) >= self.config.half_open_timeout)
                    .unwrap_or(false);
                if stalled {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    return false;
                }
                if inner.half_open_attempts < self.config.half_open_max_attempts {
                    inner.half_open_attempts += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        push_outcome(&mut inner.window, now, true, self.config.failure_rate_window);
        inner.consecutive_failures = 0;

        match inner.state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_successes = 0;
                    inner.half_open_attempts = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        push_outcome(&mut inner.window, now, false, self.config.failure_rate_window);
        inner.consecutive_successes = 0;

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                let rate = window_failure_rate(&inner.window);
                if inner.consecutive_failures >= self.config.failure_threshold
                    || rate >= self.config.failure_rate_threshold
                {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                inner.consecutive_failures = 0;
                inner.half_open_attempts = 0;
            }
            CircuitState::Open => {}
        }
    }

    /// Blended health score (spec §4.5):
    /// `0.5*state_weight + 0.3*success_rate + 0.1*min(consecutive_success/10,1)
    /// - 0.1*min(consecutive_failures/5,1)`, clamped to `[0, 1]`.
    /// `state_weight` is `1.0` CLOSED, `0.5` HALF_OPEN, `0.0` OPEN.
    pub fn health_score(&self) -> f64 {
        let inner = self.inner.lock().unwrap();
        let state_weight = match inner.state {
            CircuitState::Closed => 1.0,
            CircuitState::HalfOpen => 0.5,
            CircuitState::Open => 0.0,
        };
        let success_rate = if inner.window.is_empty() {
            1.0
        } else {
            1.0 - window_failure_rate(&inner.window)
        };
        let success_term = (inner.consecutive_successes as f64 / 10.0).min(1.0);
        let failure_term = (inner.consecutive_failures as f64 / 5.0).min(1.0);

        let score = 0.5 * state_weight + 0.3 * success_rate + 0.1 * success_term - 0.1 * failure_term;
        score.clamp(0.0, 1.0)
    }

    pub fn is_healthy(&self) -> bool {
        self.health_score() >= self.config.min_health_score
    }

    /// Gates, runs, and records the outcome of a single call in one step
    /// (spec §4.5). An `OPEN` breaker rejects with
    /// [`CircuitBreakerError::Open`] before `f` is ever invoked.
    pub async fn execute<F, Fut, T>(&self, gateway: &str, f: F) -> Result<T, CircuitBreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        if !self.allow_request() {
            return Err(CircuitBreakerError::Open {
                gateway: gateway.to_string(),
                health_score: self.health_score(),
            });
        }

        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(CircuitBreakerError::Gateway(e))
            }
        }
    }
}

fn push_outcome(window: &mut VecDeque<Outcome>, now: Instant, success: bool, keep: Duration) {
    window.push_back(Outcome { at: now, success });
    while let Some(front) = window.front() {
        if now.duration_since(front.at) > keep {
            window.pop_front();
        } else {
            break;
        }
    }
}

fn window_failure_rate(window: &VecDeque<Outcome>) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let failures = window.iter().filter(|o| !o.success).count();
    failures as f64 / window.len() as f64
}
