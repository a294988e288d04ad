use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of currencies the payment core is allowed to route and settle in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    USD,
    EUR,
    GBP,
    INR,
    AUD,
    CAD,
}

impl Currency {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_uppercase().as_str() {
            "USD" => Some(Self::USD),
            "EUR" => Some(Self::EUR),
            "GBP" => Some(Self::GBP),
            "INR" => Some(Self::INR),
            "AUD" => Some(Self::AUD),
            "CAD" => Some(Self::CAD),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::INR => "INR",
            Self::AUD => "AUD",
            Self::CAD => "CAD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_codes_case_insensitively() {
        assert_eq!(Currency::from_code("usd"), Some(Currency::USD));
        assert_eq!(Currency::from_code("Inr"), Some(Currency::INR));
    }

    #[test]
    fn rejects_unknown_codes() {
        assert_eq!(Currency::from_code("XYZ"), None);
    }
}
