use std::fmt::Display;

use rust_decimal::Decimal;

use crate::gateway::error::GatewayError;

pub mod api;
pub mod poller;
pub mod registry;
pub mod session;
pub mod view;

/// Country prefix of Kenyan MSISDNs
pub const COUNTRY_PREFIX: &str = "254";
pub const ACCOUNT_REFERENCE: &str = "AgriConnect Purchase";

/// Bring user input to the `254XXXXXXXXX` form: numbers already carrying the country prefix are
/// kept, anything else loses its leading zeros and gains the prefix.
pub fn normalize_phone_number(input: &str) -> String {
    let input = input.trim();
    if input.starts_with(COUNTRY_PREFIX) {
        input.to_string()
    } else {
        format!("{COUNTRY_PREFIX}{}", input.trim_start_matches('0'))
    }
}

/// One payment attempt as sent to the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    phone_number: String,
    amount: Decimal,
    account_reference: String,
}

impl PaymentRequest {
    pub fn new(
        phone_number: impl Into<String>,
        amount: Decimal,
        account_reference: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let phone_number = phone_number.into();
        if phone_number.is_empty() {
            return Err(ValidationError::EmptyPhoneNumber);
        }
        let valid_phone = phone_number.len() == 12
            && phone_number.starts_with(COUNTRY_PREFIX)
            && phone_number.bytes().all(|b| b.is_ascii_digit());
        if !valid_phone {
            return Err(ValidationError::InvalidPhoneNumber(phone_number));
        }
        if amount <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount(amount));
        }
        Ok(Self {
            phone_number,
            amount,
            account_reference: account_reference.into(),
        })
    }

    pub fn phone_number(&self) -> &str {
        &self.phone_number
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn account_reference(&self) -> &str {
        &self.account_reference
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyPhoneNumber,
    InvalidPhoneNumber(String),
    NonPositiveAmount(Decimal),
}

impl std::error::Error for ValidationError {}

impl Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyPhoneNumber => f.write_str("Phone number is required"),
            ValidationError::InvalidPhoneNumber(_) => {
                f.write_str("Phone number must be in the format 254XXXXXXXXX")
            }
            ValidationError::NonPositiveAmount(amount) => {
                write!(f, "Amount must be positive, got {amount}")
            }
        }
    }
}

#[derive(Debug)]
pub enum PaymentError {
    Validation(ValidationError),
    Gateway(GatewayError),
    /// A request of this view is still in flight
    InProgress,
}

impl From<ValidationError> for PaymentError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<GatewayError> for PaymentError {
    fn from(value: GatewayError) -> Self {
        Self::Gateway(value)
    }
}

impl std::error::Error for PaymentError {}

impl Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentError::Validation(e) => write!(f, "{e}"),
            PaymentError::Gateway(e) => write!(f, "Failed to initiate payment: {e}"),
            PaymentError::InProgress => f.write_str("A payment request is already in progress"),
        }
    }
}

/// How a polled payment ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Completed,
    Failed(crate::gateway::status::TransactionStatus),
}

impl PaymentOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}
