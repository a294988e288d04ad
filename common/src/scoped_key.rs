use serde::{Deserialize, Serialize};
use std::fmt;

/// `merchantId:operation:clientKey`, the unit the idempotency engine and the
/// lock manager both key off of.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopedKey(String);

impl ScopedKey {
    pub fn new(merchant_id: &str, operation: &str, client_key: &str) -> Self {
        Self(format!("{merchant_id}:{operation}:{client_key}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_merchant_operation_key() {
        let k = ScopedKey::new("m1", "create", "k1");
        assert_eq!(k.as_str(), "m1:create:k1");
    }
}
