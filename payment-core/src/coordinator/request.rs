use common::Money;
use std::collections::HashMap;

use crate::domain::{Customer, MetadataValue, PaymentMethod};

/// Input to `PaymentCoordinator::create_payment`. `merchant_id` plus
/// `idempotency_key` form the scoped idempotency key (spec §4.4); two
/// merchants may reuse the same client key without colliding.
#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    pub merchant_id: String,
    pub idempotency_key: String,
    pub amount: Money,
    pub payment_method: PaymentMethod,
    pub customer: Customer,
    pub metadata: HashMap<String, MetadataValue>,
}
