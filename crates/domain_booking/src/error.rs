//! Booking domain errors

use thiserror::Error;

use core_kernel::PortError;

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// Host verification is not approved
    #[error("Host {0} cannot accept bookings")]
    HostNotBookable(String),

    /// Actor is neither host nor guest of the booking
    #[error("Not a party to booking {0}")]
    Forbidden(String),

    #[error("Booking not found: {0}")]
    NotFound(String),

    /// Tariff missing, inactive or owned by another host
    #[error("Tariff not found: {0}")]
    TariffNotFound(String),

    #[error("Booking cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Another open booking holds the host's slot
    #[error("Slot already booked")]
    SlotTaken,

    #[error("Storage error: {0}")]
    Storage(PortError),
}

impl BookingError {
    pub fn validation(message: impl Into<String>) -> Self {
        BookingError::Validation(message.into())
    }
}

impl From<PortError> for BookingError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { id, .. } => BookingError::NotFound(id),
            PortError::Validation { message, .. } => BookingError::Validation(message),
            PortError::Conflict { .. } => BookingError::SlotTaken,
            other => BookingError::Storage(other),
        }
    }
}
