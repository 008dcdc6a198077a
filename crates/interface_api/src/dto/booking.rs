//! Booking DTOs

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use domain_booking::Booking;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub host_id: Uuid,
    pub guest_id: Uuid,
    pub tariff_id: Uuid,
    pub scheduled_date: NaiveDate,
    pub start_time: NaiveTime,
    /// Add-on names, e.g. `screen_sharing`
    #[serde(default)]
    pub services: Vec<String>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub id: Uuid,
    pub host_id: Uuid,
    pub guest_id: Uuid,
    pub tariff_id: Uuid,
    pub scheduled_date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    pub price: Decimal,
    pub currency: String,
    pub status: String,
    pub services: Vec<String>,
    pub notes: Option<String>,
    pub cancelled_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            id: booking.id.into_uuid(),
            host_id: booking.host_id.into_uuid(),
            guest_id: booking.guest_id.into_uuid(),
            tariff_id: booking.tariff_id.into_uuid(),
            scheduled_date: booking.scheduled_date,
            start_time: booking.start_time,
            duration_minutes: booking.duration_minutes,
            price: booking.price.amount(),
            currency: booking.price.currency().code().to_string(),
            status: booking.status.as_str().to_string(),
            services: booking.services.iter().map(|a| a.as_str().to_string()).collect(),
            notes: booking.notes,
            cancelled_by: booking.cancelled_by.map(|p| p.as_str().to_string()),
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        }
    }
}
