//! Request handlers

pub mod health;
pub mod pricing;
pub mod bookings;
pub mod payments;
pub mod verification;
pub mod invoices;

use core_kernel::{Currency, UserId};

use crate::auth::Claims;
use crate::error::ApiError;
use crate::AppState;

/// The authenticated caller
pub(crate) fn caller(claims: &Claims) -> Result<UserId, ApiError> {
    Ok(claims.user_id()?)
}

/// Callers may act for themselves; admins may act for anyone
pub(crate) fn acting_for(claims: &Claims, user_id: UserId) -> Result<UserId, ApiError> {
    let me = caller(claims)?;
    if me == user_id || claims.is_admin() {
        Ok(me)
    } else {
        Err(ApiError::Forbidden("cannot act on behalf of another user".to_string()))
    }
}

/// The requested currency, or the configured default
pub(crate) fn currency(state: &AppState, requested: Option<&str>) -> Result<Currency, ApiError> {
    requested
        .unwrap_or(state.config.currency.as_str())
        .parse()
        .map_err(|e: core_kernel::MoneyError| ApiError::Validation(e.to_string()))
}
