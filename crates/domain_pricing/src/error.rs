//! Pricing domain errors

use thiserror::Error;

use core_kernel::PortError;

/// Errors that can occur in the pricing domain
#[derive(Debug, Error)]
pub enum PricingError {
    /// Invalid duration, price or add-on
    #[error("Validation error: {0}")]
    Validation(String),

    /// Activating another tariff would exceed the host's cap
    #[error("Host {host_id} already has {limit} active tariffs")]
    TariffLimitExceeded { host_id: String, limit: usize },

    /// Tariff missing or owned by another host
    #[error("Tariff not found: {0}")]
    TariffNotFound(String),

    /// Only active tariffs can be primary
    #[error("Tariff {0} is inactive")]
    TariffInactive(String),

    /// A pending or confirmed booking references the tariff
    #[error("Tariff {0} is referenced by an open booking")]
    TariffInUse(String),

    /// Concurrent write collided with a uniqueness rule
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage failure
    #[error("Storage error: {0}")]
    Storage(PortError),
}

impl PricingError {
    pub fn validation(message: impl Into<String>) -> Self {
        PricingError::Validation(message.into())
    }

    /// Returns true for errors that map to a 409 response
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            PricingError::TariffLimitExceeded { .. }
                | PricingError::TariffInactive(_)
                | PricingError::TariffInUse(_)
                | PricingError::Conflict(_)
        )
    }
}

impl From<PortError> for PricingError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { id, .. } => PricingError::TariffNotFound(id),
            PortError::Validation { message, .. } => PricingError::Validation(message),
            PortError::Conflict { message } => PricingError::Conflict(message),
            other => PricingError::Storage(other),
        }
    }
}

impl From<PricingError> for PortError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::Validation(message) => PortError::validation(message),
            PricingError::TariffNotFound(id) => PortError::not_found("Tariff", id),
            PricingError::Storage(inner) => inner,
            other => PortError::conflict(other.to_string()),
        }
    }
}
