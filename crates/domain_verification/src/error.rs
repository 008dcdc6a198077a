//! Verification domain errors

use thiserror::Error;

use core_kernel::PortError;

#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Validation error: {0}")]
    Validation(String),

    /// Token unknown, already used or replaced by a newer one
    #[error("Invalid activation token")]
    InvalidToken,

    #[error("Activation token has expired")]
    TokenExpired,

    #[error("Cannot {action} while verification is {from}")]
    InvalidTransition { from: String, action: String },

    #[error("No verification for user {0}")]
    NotFound(String),

    /// A concurrent write changed the record first
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(PortError),
}

impl VerificationError {
    pub fn validation(message: impl Into<String>) -> Self {
        VerificationError::Validation(message.into())
    }
}

impl From<PortError> for VerificationError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound { id, .. } => VerificationError::NotFound(id),
            PortError::Validation { message, .. } => VerificationError::Validation(message),
            PortError::Conflict { message } => VerificationError::Conflict(message),
            other => VerificationError::Storage(other),
        }
    }
}
