//! Booking handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{BookingId, TariffId, UserId};
use domain_booking::CreateBooking;
use domain_pricing::Addon;

use super::{acting_for, caller};
use crate::auth::{roles, Claims};
use crate::dto::booking::*;
use crate::{error::ApiError, AppState};

/// Creates a pending booking; the guest is the caller
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), ApiError> {
    request.validate()?;
    let guest_id = UserId::from_uuid(request.guest_id);
    acting_for(&claims, guest_id)?;

    let services = request
        .services
        .iter()
        .map(|s| s.parse::<Addon>())
        .collect::<Result<Vec<_>, _>>()?;

    let booking = state
        .bookings
        .create(CreateBooking {
            host_id: UserId::from_uuid(request.host_id),
            guest_id,
            tariff_id: TariffId::from_uuid(request.tariff_id),
            scheduled_date: request.scheduled_date,
            start_time: request.start_time,
            services,
            notes: request.notes,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(booking.into())))
}

/// Bookings where the caller is host or guest
pub async fn list_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<BookingResponse>>, ApiError> {
    let me = caller(&claims)?;
    let bookings = state.bookings.list_for_user(me).await?;
    Ok(Json(bookings.into_iter().map(BookingResponse::from).collect()))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, ApiError> {
    let me = caller(&claims)?;
    let booking_id = BookingId::from_uuid(id);
    let booking = if claims.is_admin() {
        state.bookings.find(booking_id).await?
    } else {
        state.bookings.get(booking_id, me).await?
    };
    Ok(Json(booking.into()))
}

/// Cancels as the caller's side of the booking
pub async fn cancel_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, ApiError> {
    let me = caller(&claims)?;
    let booking = state.bookings.cancel(BookingId::from_uuid(id), me).await?;
    Ok(Json(booking.into()))
}

/// Session-end signal from the call service
pub async fn complete_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, ApiError> {
    claims.require(roles::SYSTEM)?;
    let booking = state.bookings.complete(BookingId::from_uuid(id)).await?;
    Ok(Json(booking.into()))
}
