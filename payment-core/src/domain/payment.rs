use chrono::{DateTime, Utc};
use common::Money;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::domain::state_machine::{StateMachine, StateMachineError};

/// Opaque payment identifier. Generated as a UUIDv7 so ids sort roughly by
/// creation time (spec §9 leaves the id scheme open; uniqueness is all
/// that's required).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentId(pub Uuid);

impl PaymentId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentState {
    Initiated,
    Authenticated,
    Processing,
    Success,
    Failure,
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initiated => "INITIATED",
            Self::Authenticated => "AUTHENTICATED",
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
        };
        write!(f, "{s}")
    }
}

/// Per-variant payment method descriptor (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethod {
    Card {
        card_number: String,
        expiry_month: u8,
        expiry_year: u16,
    },
    Upi {
        vpa: String,
    },
    NetBanking {
        bank_code: String,
    },
    Wallet {
        provider: String,
    },
    PayLater {
        provider: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub email: String,
    pub phone: Option<String>,
    pub billing_country: Option<String>,
}

/// A metadata value coerced to one of three scalar shapes; anything else is
/// dropped by the sanitizer in `sanitize_metadata` (spec §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    String(String),
    Number(f64),
    Bool(bool),
}

/// Drops keys that don't match `[A-Za-z0-9_]+` or exceed 128 chars, and
/// truncates/drops values outside the closed string/number/boolean shape.
pub fn sanitize_metadata(
    raw: HashMap<String, MetadataValue>,
) -> HashMap<String, MetadataValue> {
    raw.into_iter()
        .filter(|(k, _)| {
            !k.is_empty()
                && k.len() <= 128
                && k.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
        .map(|(k, v)| {
            let v = match v {
                MetadataValue::String(s) if s.len() > 1000 => {
                    MetadataValue::String(s.chars().take(1000).collect())
                }
                other => other,
            };
            (k, v)
        })
        .collect()
}

/// The aggregate root. Fields are private; every mutation goes through a
/// method that enforces the invariants in spec §3 (terminal immutability,
/// gateway/txn-id presence per state, monotonic version).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    idempotency_key: String,
    state: PaymentState,
    amount: Money,
    payment_method: PaymentMethod,
    customer: Customer,
    gateway: Option<String>,
    gateway_transaction_id: Option<String>,
    failure_reason: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    metadata: HashMap<String, MetadataValue>,
}

impl Payment {
    pub fn new(
        idempotency_key: String,
        amount: Money,
        payment_method: PaymentMethod,
        customer: Customer,
        metadata: HashMap<String, MetadataValue>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PaymentId::new(),
            idempotency_key,
            state: PaymentState::Initiated,
            amount,
            payment_method,
            customer,
            gateway: None,
            gateway_transaction_id: None,
            failure_reason: None,
            version: 1,
            created_at: now,
            updated_at: now,
            metadata: sanitize_metadata(metadata),
        }
    }

    /// Reconstruct a `Payment` from persisted fields, bypassing the
    /// construction-time defaults `new` applies. Used by `Repository`
    /// implementations when loading a row.
    #[allow(clippy::too_many_arguments)]
    pub fn reconstitute(
        id: PaymentId,
        idempotency_key: String,
        state: PaymentState,
        amount: Money,
        payment_method: PaymentMethod,
        customer: Customer,
        gateway: Option<String>,
        gateway_transaction_id: Option<String>,
        failure_reason: Option<String>,
        version: i64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        metadata: HashMap<String, MetadataValue>,
    ) -> Self {
        Self {
            id,
            idempotency_key,
            state,
            amount,
            payment_method,
            customer,
            gateway,
            gateway_transaction_id,
            failure_reason,
            version,
            created_at,
            updated_at,
            metadata,
        }
    }

    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    pub fn state(&self) -> PaymentState {
        self.state
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn payment_method(&self) -> &PaymentMethod {
        &self.payment_method
    }

    pub fn customer(&self) -> &Customer {
        &self.customer
    }

    pub fn gateway(&self) -> Option<&str> {
        self.gateway.as_deref()
    }

    pub fn gateway_transaction_id(&self) -> Option<&str> {
        self.gateway_transaction_id.as_deref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn metadata(&self) -> &HashMap<String, MetadataValue> {
        &self.metadata
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, PaymentState::Success | PaymentState::Failure)
    }

    fn bump(&mut self, to: PaymentState) -> Result<(), StateMachineError> {
        StateMachine::validate(self.state, to)?;
        self.state = to;
        self.version += 1;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn authenticate(&mut self, gateway: String) -> Result<(), StateMachineError> {
        self.bump(PaymentState::Authenticated)?;
        self.gateway = Some(gateway);
        Ok(())
    }

    pub fn start_processing(
        &mut self,
        gateway_transaction_id: String,
    ) -> Result<(), StateMachineError> {
        self.bump(PaymentState::Processing)?;
        self.gateway_transaction_id = Some(gateway_transaction_id);
        Ok(())
    }

    pub fn succeed(&mut self) -> Result<(), StateMachineError> {
        self.bump(PaymentState::Success)
    }

    pub fn fail(&mut self, reason: String) -> Result<(), StateMachineError> {
        self.bump(PaymentState::Failure)?;
        self.failure_reason = Some(reason);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Currency;
    use rust_decimal_macros::dec;

    fn sample_payment() -> Payment {
        Payment::new(
            "k1".to_string(),
            Money::new(dec!(100), Currency::USD).unwrap(),
            PaymentMethod::Upi {
                vpa: "a@bank".to_string(),
            },
            Customer {
                id: "cust_1".to_string(),
                email: "a@b.com".to_string(),
                phone: None,
                billing_country: None,
            },
            HashMap::new(),
        )
    }

    #[test]
    fn new_payment_starts_initiated_at_version_one() {
        let p = sample_payment();
        assert_eq!(p.state(), PaymentState::Initiated);
        assert_eq!(p.version(), 1);
        assert!(p.gateway().is_none());
    }

    #[test]
    fn full_happy_path_bumps_version_each_time() {
        let mut p = sample_payment();
        p.authenticate("stripe".to_string()).unwrap();
        assert_eq!(p.version(), 2);
        assert_eq!(p.gateway(), Some("stripe"));

        p.start_processing("txn_123".to_string()).unwrap();
        assert_eq!(p.version(), 3);
        assert_eq!(p.gateway_transaction_id(), Some("txn_123"));

        p.succeed().unwrap();
        assert_eq!(p.version(), 4);
        assert!(p.is_terminal());
    }

    #[test]
    fn failure_after_processing_sets_reason() {
        let mut p = sample_payment();
        p.authenticate("stripe".to_string()).unwrap();
        p.start_processing("txn_123".to_string()).unwrap();
        p.fail("card declined".to_string()).unwrap();
        assert_eq!(p.failure_reason(), Some("card declined"));
        assert!(p.is_terminal());
    }

    #[test]
    fn terminal_payment_rejects_further_transitions() {
        let mut p = sample_payment();
        p.authenticate("stripe".to_string()).unwrap();
        p.start_processing("txn_123".to_string()).unwrap();
        p.succeed().unwrap();

        let err = p.fail("too late".to_string()).unwrap_err();
        assert!(matches!(err, StateMachineError::TerminalStateViolation(_)));
    }

    #[test]
    fn sanitize_metadata_drops_bad_keys_and_truncates_strings() {
        let mut raw = HashMap::new();
        raw.insert("good_key".to_string(), MetadataValue::Bool(true));
        raw.insert("bad key!".to_string(), MetadataValue::Bool(false));
        raw.insert(
            "long".to_string(),
            MetadataValue::String("x".repeat(2000)),
        );

        let clean = sanitize_metadata(raw);
        assert!(clean.contains_key("good_key"));
        assert!(!clean.contains_key("bad key!"));
        match clean.get("long").unwrap() {
            MetadataValue::String(s) => assert_eq!(s.len(), 1000),
            _ => panic!("expected string"),
        }
    }
}
