use common::Money;
use std::sync::Arc;

/// The subset of a payment the router is allowed to look at when deciding
/// where to send it. Deliberately narrower than the full `Payment`
/// aggregate so routing rules can't reach into fields like the gateway
/// transaction id that don't exist yet at routing time.
#[derive(Debug, Clone)]
pub struct RoutingContext {
    pub amount: Money,
    pub payment_method_kind: String,
    pub billing_country: Option<String>,
}

/// A named override: when `predicate` matches, route to `gateway` before
/// falling back to scoring (spec §4.6). The circuit breaker still has the
/// final say — a matching rule whose gateway is unavailable is skipped.
#[derive(Clone)]
pub struct RoutingRule {
    pub name: String,
    pub gateway: String,
    pub predicate: Arc<dyn Fn(&RoutingContext) -> bool + Send + Sync>,
}

impl RoutingRule {
    pub fn new(
        name: impl Into<String>,
        gateway: impl Into<String>,
        predicate: impl Fn(&RoutingContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            gateway: gateway.into(),
            predicate: Arc::new(predicate),
        }
    }
}
