use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::currency::Currency;

const MAX_AMOUNT: &str = "999999999";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MoneyError {
    #[error("amount must be greater than zero")]
    NotPositive,
    #[error("amount exceeds the maximum of 999,999,999")]
    TooLarge,
    #[error("amount has more than 2 decimal places")]
    TooPrecise,
}

/// A non-negative decimal amount paired with its currency, rounded to 2 places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Result<Self, MoneyError> {
        if amount <= Decimal::ZERO {
            return Err(MoneyError::NotPositive);
        }
        let max: Decimal = MAX_AMOUNT.parse().expect("valid literal");
        if amount > max {
            return Err(MoneyError::TooLarge);
        }
        if amount.scale() > 2 {
            return Err(MoneyError::TooPrecise);
        }
        Ok(Self { amount, currency })
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_zero_and_negative() {
        assert_eq!(Money::new(dec!(0), Currency::USD), Err(MoneyError::NotPositive));
        assert_eq!(Money::new(dec!(-1), Currency::USD), Err(MoneyError::NotPositive));
    }

    #[test]
    fn rejects_excess_precision() {
        assert_eq!(
            Money::new(dec!(10.123), Currency::USD),
            Err(MoneyError::TooPrecise)
        );
    }

    #[test]
    fn rejects_amount_above_ceiling() {
        assert_eq!(
            Money::new(dec!(1000000000), Currency::USD),
            Err(MoneyError::TooLarge)
        );
    }

    #[test]
    fn accepts_valid_amount() {
        let m = Money::new(dec!(100.50), Currency::USD).unwrap();
        assert_eq!(m.amount(), dec!(100.50));
    }
}
