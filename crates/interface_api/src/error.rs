//! API error handling
//!
//! Domain errors are folded into a handful of HTTP outcomes. Processor and
//! storage details are logged here and never reach the response body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use core_kernel::PortError;
use domain_billing::BillingError;
use domain_booking::BookingError;
use domain_pricing::PricingError;
use domain_verification::VerificationError;

use crate::auth::AuthError;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Field-level validator failures
    #[error("Validation failed")]
    InvalidFields(Vec<String>),

    /// The processor refused or failed; clients only ever see a generic message
    #[error("Payment failed")]
    PaymentFailed,

    /// Storage is temporarily unavailable; the request may be retried
    #[error("Service unavailable")]
    Unavailable,

    #[error("Internal server error")]
    Internal,
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) | ApiError::InvalidFields(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PaymentFailed => StatusCode::BAD_GATEWAY,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Validation(_) | ApiError::InvalidFields(_) => "validation_error",
            ApiError::Unauthorized => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Conflict(_) => "conflict",
            ApiError::PaymentFailed => "payment_failed",
            ApiError::Unavailable => "unavailable",
            ApiError::Internal => "internal_error",
        }
    }

    /// Logs the storage failure and picks 503 for transient ones
    fn storage(err: PortError) -> Self {
        if err.is_transient() {
            error!(error = %err, "Transient storage failure");
            ApiError::Unavailable
        } else {
            error!(error = %err, "Storage failure");
            ApiError::Internal
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let message = match &self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Forbidden(msg)
            | ApiError::Conflict(msg)
            | ApiError::Validation(msg) => msg.clone(),
            other => other.to_string(),
        };
        let details = match self {
            ApiError::InvalidFields(fields) => Some(fields),
            _ => None,
        };

        let body = ErrorResponse {
            error: kind.to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<PricingError> for ApiError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::Validation(msg) => ApiError::Validation(msg),
            PricingError::TariffNotFound(_) => ApiError::NotFound(err.to_string()),
            PricingError::Storage(inner) => ApiError::storage(inner),
            conflict => ApiError::Conflict(conflict.to_string()),
        }
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Validation(msg) => ApiError::Validation(msg),
            BookingError::HostNotBookable(_) | BookingError::Forbidden(_) => ApiError::Forbidden(err.to_string()),
            BookingError::NotFound(_) | BookingError::TariffNotFound(_) => ApiError::NotFound(err.to_string()),
            BookingError::InvalidTransition { .. } | BookingError::SlotTaken => ApiError::Conflict(err.to_string()),
            BookingError::Storage(inner) => ApiError::storage(inner),
        }
    }
}

impl From<VerificationError> for ApiError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::Validation(msg) => ApiError::Validation(msg),
            VerificationError::InvalidToken | VerificationError::TokenExpired => ApiError::BadRequest(err.to_string()),
            VerificationError::NotFound(_) => ApiError::NotFound(err.to_string()),
            VerificationError::InvalidTransition { .. } | VerificationError::Conflict(_) => {
                ApiError::Conflict(err.to_string())
            }
            VerificationError::Storage(inner) => ApiError::storage(inner),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::Validation(msg) | BillingError::MalformedEvent(msg) => ApiError::Validation(msg),
            BillingError::Signature(_) => ApiError::BadRequest(err.to_string()),
            BillingError::Forbidden(_) => ApiError::Forbidden(err.to_string()),
            BillingError::NotFound(_) => ApiError::NotFound(err.to_string()),
            BillingError::InvalidState(_) => ApiError::Conflict(err.to_string()),
            BillingError::Processor(inner) => {
                error!(error = %inner, retryable = inner.is_retryable(), "Payment processor call failed");
                ApiError::PaymentFailed
            }
            BillingError::Booking(inner) => inner.into(),
            BillingError::Verification(inner) => inner.into(),
            BillingError::Money(inner) => {
                error!(error = %inner, "Settlement calculation failed");
                ApiError::Internal
            }
            BillingError::Storage(inner) => ApiError::storage(inner),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingPermission(role) => ApiError::Forbidden(format!("requires the {} role", role)),
            _ => ApiError::Unauthorized,
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => format!("{}: {}", field, message),
                    None => format!("{}: {}", field, e.code),
                })
            })
            .collect();
        details.sort();
        ApiError::InvalidFields(details)
    }
}
