//! PostgreSQL booking adapter

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use core_kernel::{BookingId, BookingParty, DomainPort, PortError, TariffId, UserId};
use domain_booking::{Booking, BookingPort, BookingStatus, StatusChange};
use domain_pricing::Addon;

use super::{money, to_u32};
use crate::error::DatabaseError;

const BOOKING_COLUMNS: &str = "id, host_id, guest_id, tariff_id, scheduled_date, start_time, duration_minutes, \
     price, currency, status, services, notes, cancelled_by, created_at, updated_at";

const OPEN_SLOT_INDEX: &str = "bookings_open_slot";

#[derive(Debug, sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    host_id: Uuid,
    guest_id: Uuid,
    tariff_id: Uuid,
    scheduled_date: NaiveDate,
    start_time: NaiveTime,
    duration_minutes: i32,
    price: Decimal,
    currency: String,
    status: String,
    services: Vec<String>,
    notes: Option<String>,
    cancelled_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_party(value: &str) -> Result<BookingParty, DatabaseError> {
    match value {
        "host" => Ok(BookingParty::Host),
        "guest" => Ok(BookingParty::Guest),
        other => Err(DatabaseError::decode(format!("unknown booking party '{}'", other))),
    }
}

impl TryFrom<BookingRow> for Booking {
    type Error = DatabaseError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status: BookingStatus = row.status.parse().map_err(|e| DatabaseError::decode(format!("{}", e)))?;
        let services = row
            .services
            .iter()
            .map(|s| s.parse::<Addon>().map_err(|e| DatabaseError::decode(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Booking {
            id: BookingId::from_uuid(row.id),
            host_id: UserId::from_uuid(row.host_id),
            guest_id: UserId::from_uuid(row.guest_id),
            tariff_id: TariffId::from_uuid(row.tariff_id),
            scheduled_date: row.scheduled_date,
            start_time: row.start_time,
            duration_minutes: to_u32(row.duration_minutes, "duration_minutes")?,
            price: money(row.price, &row.currency)?,
            status,
            services,
            notes: row.notes,
            cancelled_by: row.cancelled_by.as_deref().map(parse_party).transpose()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// PostgreSQL implementation of `BookingPort`
///
/// Slot exclusivity is the partial unique index `bookings_open_slot`; status
/// changes are a single guarded `UPDATE`.
#[derive(Debug, Clone)]
pub struct PostgresBookingAdapter {
    pool: PgPool,
}

impl PostgresBookingAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, booking: &Booking) -> Result<(), DatabaseError> {
        let services: Vec<String> = booking.services.iter().map(|a| a.as_str().to_string()).collect();
        sqlx::query(
            r#"
            INSERT INTO bookings (id, host_id, guest_id, tariff_id, scheduled_date, start_time,
                                  duration_minutes, price, currency, status, services, notes,
                                  cancelled_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(booking.id.as_uuid())
        .bind(booking.host_id.as_uuid())
        .bind(booking.guest_id.as_uuid())
        .bind(booking.tariff_id.as_uuid())
        .bind(booking.scheduled_date)
        .bind(booking.start_time)
        .bind(booking.duration_minutes as i32)
        .bind(booking.price.amount())
        .bind(booking.price.currency().code())
        .bind(booking.status.as_str())
        .bind(&services)
        .bind(booking.notes.as_deref())
        .bind(booking.cancelled_by.map(|p| p.as_str()))
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch(&self, booking_id: BookingId) -> Result<Option<Booking>, DatabaseError> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
                .bind(booking_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        row.map(Booking::try_from).transpose()
    }

    async fn compare_and_set(&self, change: &StatusChange) -> Result<Option<Booking>, DatabaseError> {
        let from: Vec<&str> = change.from.iter().map(|s| s.as_str()).collect();
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            r#"
            UPDATE bookings
            SET status = $3,
                cancelled_by = COALESCE($4, cancelled_by),
                updated_at = $5
            WHERE id = $1 AND status = ANY($2)
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        ))
        .bind(change.booking_id.as_uuid())
        .bind(&from)
        .bind(change.to.as_str())
        .bind(change.cancelled_by.map(|p| p.as_str()))
        .bind(change.at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Booking::try_from(row)?)),
            None => {
                let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM bookings WHERE id = $1)")
                    .bind(change.booking_id.as_uuid())
                    .fetch_one(&self.pool)
                    .await?;
                if exists {
                    Ok(None)
                } else {
                    Err(DatabaseError::not_found("Booking", change.booking_id))
                }
            }
        }
    }

    async fn fetch_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, DatabaseError> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM bookings
            WHERE host_id = $1 OR guest_id = $1
            ORDER BY scheduled_date DESC, start_time DESC
            "#,
            BOOKING_COLUMNS
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Booking::try_from).collect()
    }
}

impl DomainPort for PostgresBookingAdapter {}

#[async_trait]
impl BookingPort for PostgresBookingAdapter {
    #[instrument(skip(self, booking), fields(booking_id = %booking.id, host_id = %booking.host_id))]
    async fn insert_booking(&self, booking: Booking) -> Result<Booking, PortError> {
        match self.insert(&booking).await {
            Ok(()) => Ok(booking),
            Err(e) if e.is_duplicate_of(OPEN_SLOT_INDEX) => Err(PortError::conflict("slot already booked")),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_booking(&self, booking_id: BookingId) -> Result<Option<Booking>, PortError> {
        Ok(self.fetch(booking_id).await?)
    }

    #[instrument(skip(self, change), fields(booking_id = %change.booking_id, to = %change.to.as_str()))]
    async fn transition_status(&self, change: StatusChange) -> Result<Option<Booking>, PortError> {
        match self.compare_and_set(&change).await {
            Err(DatabaseError::NotFound(_)) => Err(PortError::not_found("Booking", change.booking_id)),
            other => Ok(other?),
        }
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, PortError> {
        Ok(self.fetch_for_user(user_id).await?)
    }
}
