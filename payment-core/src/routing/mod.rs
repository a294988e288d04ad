//! Adaptive routing (spec §4.6): a short list of rule overrides, a
//! weighted-scoring fallback over the remaining eligible gateways, and a
//! safety fallback gateway tried last when the circuit breaker has
//! excluded everything else.

pub mod rule;

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::ScoringWeights;
use crate::metrics::GatewayMetrics;
pub use rule::{RoutingContext, RoutingRule};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("no gateway is eligible to route this payment")]
    NoEligibleGateway,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingReason {
    RuleMatch(String),
    Scored,
    SafetyFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterDecision {
    pub gateway: String,
    pub reason: RoutingReason,
}

struct GatewayEntry {
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<GatewayMetrics>,
    /// Static per-gateway processing cost used by the scoring fallback.
    /// Not dynamically updated (see DESIGN.md).
    cost: f64,
}

pub struct Router {
    rules: Vec<RoutingRule>,
    gateways: HashMap<String, GatewayEntry>,
    safety_fallback: String,
    scoring_weights: ScoringWeights,
}

impl Router {
    pub fn new(scoring_weights: ScoringWeights, safety_fallback: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            gateways: HashMap::new(),
            safety_fallback: safety_fallback.into(),
            scoring_weights,
        }
    }

    pub fn register_gateway(
        &mut self,
        name: impl Into<String>,
        breaker: Arc<CircuitBreaker>,
        metrics: Arc<GatewayMetrics>,
        cost: f64,
    ) {
        self.gateways
            .insert(name.into(), GatewayEntry { breaker, metrics, cost });
    }

    pub fn add_rule(&mut self, rule: RoutingRule) {
        self.rules.push(rule);
    }

    /// Overrides the static cost figure used by the scoring fallback.
    /// Nothing in this crate calls this automatically — the table is not
    /// refreshed from live gateway fee responses (see DESIGN.md) — but a
    /// caller wiring in its own pricing feed can push updates through
    /// here.
    pub fn update_cost(&mut self, gateway: &str, cost: f64) -> bool {
        match self.gateways.get_mut(gateway) {
            Some(entry) => {
                entry.cost = cost;
                true
            }
            None => false,
        }
    }

    pub fn breaker(&self, gateway: &str) -> Option<&Arc<CircuitBreaker>> {
        self.gateways.get(gateway).map(|e| &e.breaker)
    }

    pub fn metrics(&self, gateway: &str) -> Option<&Arc<GatewayMetrics>> {
        self.gateways.get(gateway).map(|e| &e.metrics)
    }

    /// Selects a gateway. Eligibility here is a read-only `is_healthy`
    /// check; the actual gate-and-record decision for whichever gateway
    /// is chosen happens once, at call time, inside
    /// [`crate::circuit_breaker::CircuitBreaker::execute`]. This avoids
    /// spending a half-open probe attempt during selection and again
    /// during the call itself.
    pub fn route(&self, ctx: &RoutingContext) -> Result<RouterDecision, RouterError> {
        for rule in &self.rules {
            if (rule.predicate)(ctx) {
                if let Some(entry) = self.gateways.get(&rule.gateway) {
                    if entry.breaker.is_healthy() {
                        return Ok(RouterDecision {
                            gateway: rule.gateway.clone(),
                            reason: RoutingReason::RuleMatch(rule.name.clone()),
                        });
                    }
                }
            }
        }

        let eligible: Vec<(&String, &GatewayEntry)> = self
            .gateways
            .iter()
            .filter(|(name, entry)| **name != self.safety_fallback && entry.breaker.is_healthy())
            .collect();

        if let Some((name, _)) = eligible
            .iter()
            .map(|(name, entry)| (*name, self.score(entry)))
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(name, _)| (name, ()))
        {
            return Ok(RouterDecision {
                gateway: name.clone(),
                reason: RoutingReason::Scored,
            });
        }

        // The safety fallback is returned unconditionally when registered,
        // even with its circuit open: the coordinator's `execute` call is
        // what ultimately rejects with `CircuitOpen`, not routing itself.
        match self.gateways.get(&self.safety_fallback) {
            Some(_) => Ok(RouterDecision {
                gateway: self.safety_fallback.clone(),
                reason: RoutingReason::SafetyFallback,
            }),
            None => Err(RouterError::NoEligibleGateway),
        }
    }

    fn score(&self, entry: &GatewayEntry) -> f64 {
        let health = entry.metrics.snapshot();
        let w = &self.scoring_weights;
        let latency_score = 1.0 / (1.0 + health.avg_latency_ms / 1000.0);
        let cost_score = 1.0 / (1.0 + entry.cost);
        w.success_rate * health.success_rate + w.latency * latency_score + w.cost * cost_score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerConfig;
    use common::{Currency, Money};
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()))
    }

    fn ctx() -> RoutingContext {
        RoutingContext {
            amount: Money::new(dec!(100), Currency::USD).unwrap(),
            payment_method_kind: "upi".to_string(),
            billing_country: None,
        }
    }

    #[test]
    fn rule_match_overrides_scoring() {
        let mut router = Router::new(ScoringWeights::default(), "fallback_gw");
        router.register_gateway("fallback_gw", breaker(), Arc::new(GatewayMetrics::new()), 1.0);
        router.register_gateway("upi_specialist", breaker(), Arc::new(GatewayMetrics::new()), 1.0);
        router.add_rule(RoutingRule::new(
            "route-upi-to-specialist",
            "upi_specialist",
            |c: &RoutingContext| c.payment_method_kind == "upi",
        ));

        let decision = router.route(&ctx()).unwrap();
        assert_eq!(decision.gateway, "upi_specialist");
        assert!(matches!(decision.reason, RoutingReason::RuleMatch(_)));
    }

    #[test]
    fn scoring_prefers_higher_success_rate() {
        let mut router = Router::new(ScoringWeights::default(), "fallback_gw");
        router.register_gateway("fallback_gw", breaker(), Arc::new(GatewayMetrics::new()), 1.0);

        let good_metrics = Arc::new(GatewayMetrics::new());
        good_metrics.record(true, Duration::from_millis(50));
        router.register_gateway("good_gw", breaker(), Arc::clone(&good_metrics), 1.0);

        let bad_metrics = Arc::new(GatewayMetrics::new());
        for _ in 0..5 {
            bad_metrics.record(false, Duration::from_millis(50));
        }
        router.register_gateway("bad_gw", breaker(), bad_metrics, 1.0);

        let decision = router.route(&ctx()).unwrap();
        assert_eq!(decision.gateway, "good_gw");
        assert_eq!(decision.reason, RoutingReason::Scored);
    }

    #[test]
    fn falls_back_to_safety_gateway_when_everything_else_is_unhealthy() {
        let mut router = Router::new(ScoringWeights::default(), "fallback_gw");
        router.register_gateway("fallback_gw", breaker(), Arc::new(GatewayMetrics::new()), 1.0);

        let unhealthy_breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..CircuitBreakerConfig::default()
        }));
        unhealthy_breaker.record_failure();
        router.register_gateway("flaky_gw", unhealthy_breaker, Arc::new(GatewayMetrics::new()), 1.0);

        let decision = router.route(&ctx()).unwrap();
        assert_eq!(decision.gateway, "fallback_gw");
        assert_eq!(decision.reason, RoutingReason::SafetyFallback);
    }

    #[test]
    fn still_selects_safety_fallback_when_its_circuit_is_open() {
        let mut router = Router::new(ScoringWeights::default(), "fallback_gw");
        let fallback_breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            ..CircuitBreakerConfig::default()
        }));
        fallback_breaker.record_failure();
        router.register_gateway("fallback_gw", fallback_breaker, Arc::new(GatewayMetrics::new()), 1.0);

        // Routing still names the fallback; it is the coordinator's
        // `CircuitBreaker::execute` that ultimately rejects the call.
        let decision = router.route(&ctx()).unwrap();
        assert_eq!(decision.gateway, "fallback_gw");
        assert_eq!(decision.reason, RoutingReason::SafetyFallback);
    }
}
