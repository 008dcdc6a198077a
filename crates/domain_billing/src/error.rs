//! Billing domain errors

use thiserror::Error;

use core_kernel::{MoneyError, PortError};
use domain_booking::BookingError;
use domain_verification::VerificationError;

use crate::processor::ProcessorError;
use crate::webhook::SignatureError;

/// Errors that can occur in the billing domain
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// Caller may not act on this booking or invoice
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Booking or payment is in a state that does not allow the operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Processor call failed; the detail is logged, never shown to clients
    #[error("Payment processor error: {0}")]
    Processor(#[from] ProcessorError),

    #[error("Webhook signature rejected: {0}")]
    Signature(#[from] SignatureError),

    /// Webhook body could not be understood
    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("Calculation error: {0}")]
    Money(#[from] MoneyError),

    #[error("Storage error: {0}")]
    Storage(PortError),
}

impl BillingError {
    pub fn validation(message: impl Into<String>) -> Self {
        BillingError::Validation(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        BillingError::InvalidState(message.into())
    }
}

impl From<PortError> for BillingError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { entity_type, id } => BillingError::NotFound(format!("{} {}", entity_type, id)),
            PortError::Validation { message, .. } => BillingError::Validation(message),
            PortError::Conflict { message } => BillingError::InvalidState(message),
            other => BillingError::Storage(other),
        }
    }
}
