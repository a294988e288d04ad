//! Full-jitter exponential backoff, shared by the gateway retry policy,
//! the outbox publisher's `nextRetryAt` computation, and the idempotency
//! engine's in-flight poll loop.

use rand::Rng;
use std::time::Duration;

/// `min(base * multiplier^attempt, max)`, then uniformly jittered down to
/// somewhere in `[0, that_value]` scaled by `jitter_factor` (1.0 = full
/// jitter, 0.0 = no jitter).
pub fn jittered_delay(
    attempt: u32,
    base: Duration,
    max: Duration,
    multiplier: f64,
    jitter_factor: f64,
) -> Duration {
    let capped_exponent = attempt.min(32);
    let scaled = base.as_secs_f64() * multiplier.powi(capped_exponent as i32);
    let bounded = scaled.min(max.as_secs_f64()).max(0.0);

    let jitter_factor = jitter_factor.clamp(0.0, 1.0);
    let floor = bounded * (1.0 - jitter_factor);
    let delay_secs = if bounded > floor {
        rand::thread_rng().gen_range(floor..=bounded)
    } else {
        bounded
    };

    Duration::from_secs_f64(delay_secs)
}
