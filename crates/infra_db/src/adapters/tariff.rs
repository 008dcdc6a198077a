//! PostgreSQL tariff adapter
//!
//! Writes for one host are serialized with a transaction-scoped advisory
//! lock keyed on the host id. Inside the lock the host's rows are loaded
//! into a [`HostSchedule`], mutated with the same rules the in-memory store
//! uses, and written back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{DomainPort, PortError, TariffId, UserId};
use domain_pricing::{
    AddonFlags, DeleteOutcome, HostSchedule, PriceRange, PricingError, Tariff, TariffPort, UpsertOutcome,
    UpsertTariff,
};

use super::{money, to_u32};
use crate::error::DatabaseError;

const TARIFF_COLUMNS: &str = "id, host_id, duration_minutes, price, currency, is_active, is_primary, is_custom, \
     screen_sharing, translation, recording, transcription, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct TariffRow {
    id: Uuid,
    host_id: Uuid,
    duration_minutes: i32,
    price: Decimal,
    currency: String,
    is_active: bool,
    is_primary: bool,
    is_custom: bool,
    screen_sharing: bool,
    translation: bool,
    recording: bool,
    transcription: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TariffRow> for Tariff {
    type Error = DatabaseError;

    fn try_from(row: TariffRow) -> Result<Self, Self::Error> {
        Ok(Tariff {
            id: TariffId::from_uuid(row.id),
            host_id: UserId::from_uuid(row.host_id),
            duration_minutes: to_u32(row.duration_minutes, "duration_minutes")?,
            price: money(row.price, &row.currency)?,
            is_active: row.is_active,
            is_primary: row.is_primary,
            is_custom: row.is_custom,
            addons: AddonFlags {
                screen_sharing: row.screen_sharing,
                translation: row.translation,
                recording: row.recording,
                transcription: row.transcription,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// PostgreSQL implementation of `TariffPort`
#[derive(Debug, Clone)]
pub struct PostgresTariffAdapter {
    pool: PgPool,
}

impl PostgresTariffAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn lock_host(tx: &mut Transaction<'_, Postgres>, host_id: UserId) -> Result<(), DatabaseError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(host_id.as_uuid())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn load_schedule(
        tx: &mut Transaction<'_, Postgres>,
        host_id: UserId,
    ) -> Result<HostSchedule, DatabaseError> {
        let rows: Vec<TariffRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tariffs WHERE host_id = $1",
            TARIFF_COLUMNS
        ))
        .bind(host_id.as_uuid())
        .fetch_all(&mut **tx)
        .await?;
        let tariffs = rows.into_iter().map(Tariff::try_from).collect::<Result<Vec<_>, _>>()?;
        Ok(HostSchedule::from_tariffs(host_id, tariffs))
    }

    async fn write_tariff(tx: &mut Transaction<'_, Postgres>, tariff: &Tariff) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO tariffs (id, host_id, duration_minutes, price, currency, is_active, is_primary,
                                 is_custom, screen_sharing, translation, recording, transcription,
                                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (host_id, duration_minutes) DO UPDATE SET
                price = EXCLUDED.price,
                currency = EXCLUDED.currency,
                is_active = EXCLUDED.is_active,
                is_primary = EXCLUDED.is_primary,
                is_custom = EXCLUDED.is_custom,
                screen_sharing = EXCLUDED.screen_sharing,
                translation = EXCLUDED.translation,
                recording = EXCLUDED.recording,
                transcription = EXCLUDED.transcription,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(tariff.id.as_uuid())
        .bind(tariff.host_id.as_uuid())
        .bind(tariff.duration_minutes as i32)
        .bind(tariff.price.amount())
        .bind(tariff.price.currency().code())
        .bind(tariff.is_active)
        .bind(tariff.is_primary)
        .bind(tariff.is_custom)
        .bind(tariff.addons.screen_sharing)
        .bind(tariff.addons.translation)
        .bind(tariff.addons.recording)
        .bind(tariff.addons.transcription)
        .bind(tariff.created_at)
        .bind(tariff.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn upsert_locked(&self, request: UpsertTariff) -> Result<UpsertOutcome, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_host(&mut tx, request.host_id).await?;
        let mut schedule = Self::load_schedule(&mut tx, request.host_id).await?;

        let outcome = schedule.upsert(request.duration_minutes, request.fields, request.max_active, Utc::now());
        match &outcome {
            UpsertOutcome::Created(tariff) | UpsertOutcome::Updated(tariff) => {
                Self::write_tariff(&mut tx, tariff).await?;
                tx.commit().await?;
            }
            UpsertOutcome::LimitReached { active } => {
                debug!(host_id = %request.host_id, active, "Active tariff cap reached");
                tx.rollback().await?;
            }
        }
        Ok(outcome)
    }

    async fn set_primary_locked(
        &self,
        tariff_id: TariffId,
        host_id: UserId,
    ) -> Result<Result<Tariff, PricingError>, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_host(&mut tx, host_id).await?;
        let mut schedule = Self::load_schedule(&mut tx, host_id).await?;

        let promoted = match schedule.set_primary(tariff_id, Utc::now()) {
            Ok(tariff) => tariff,
            Err(e) => {
                tx.rollback().await?;
                return Ok(Err(e));
            }
        };

        // The partial unique index allows one primary per host, so clear first
        sqlx::query("UPDATE tariffs SET is_primary = FALSE, updated_at = $3 WHERE host_id = $1 AND id <> $2 AND is_primary")
            .bind(host_id.as_uuid())
            .bind(tariff_id.as_uuid())
            .bind(promoted.updated_at)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE tariffs SET is_primary = TRUE, updated_at = $2 WHERE id = $1")
            .bind(tariff_id.as_uuid())
            .bind(promoted.updated_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Ok(promoted))
    }

    async fn delete_guarded(&self, tariff_id: TariffId, host_id: UserId) -> Result<DeleteOutcome, DatabaseError> {
        let deleted = sqlx::query(
            r#"
            DELETE FROM tariffs t
            WHERE t.id = $1 AND t.host_id = $2
              AND NOT EXISTS (
                  SELECT 1 FROM bookings b
                  WHERE b.tariff_id = t.id AND b.status <> 'cancelled'
              )
            "#,
        )
        .bind(tariff_id.as_uuid())
        .bind(host_id.as_uuid())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if deleted > 0 {
            return Ok(DeleteOutcome::Deleted);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM tariffs WHERE id = $1 AND host_id = $2)")
            .bind(tariff_id.as_uuid())
            .bind(host_id.as_uuid())
            .fetch_one(&self.pool)
            .await?;
        Ok(if exists {
            DeleteOutcome::Referenced
        } else {
            DeleteOutcome::NotFound
        })
    }

    async fn fetch_one(&self, tariff_id: TariffId) -> Result<Option<Tariff>, DatabaseError> {
        let row: Option<TariffRow> = sqlx::query_as(&format!("SELECT {} FROM tariffs WHERE id = $1", TARIFF_COLUMNS))
            .bind(tariff_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Tariff::try_from).transpose()
    }

    async fn fetch_for_host(&self, host_id: UserId) -> Result<Vec<Tariff>, DatabaseError> {
        let rows: Vec<TariffRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tariffs WHERE host_id = $1 ORDER BY duration_minutes",
            TARIFF_COLUMNS
        ))
        .bind(host_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Tariff::try_from).collect()
    }

    async fn fetch_hosts_in_range(&self, range: PriceRange) -> Result<Vec<UserId>, DatabaseError> {
        let hosts: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT host_id FROM tariffs
            WHERE is_active AND currency = $1 AND price BETWEEN $2 AND $3
            ORDER BY host_id
            "#,
        )
        .bind(range.currency().code())
        .bind(range.min.amount())
        .bind(range.max.amount())
        .fetch_all(&self.pool)
        .await?;
        Ok(hosts.into_iter().map(UserId::from_uuid).collect())
    }
}

impl DomainPort for PostgresTariffAdapter {}

#[async_trait]
impl TariffPort for PostgresTariffAdapter {
    #[instrument(skip(self, request), fields(host_id = %request.host_id, duration = request.duration_minutes))]
    async fn upsert_tariff(&self, request: UpsertTariff) -> Result<UpsertOutcome, PortError> {
        Ok(self.upsert_locked(request).await?)
    }

    #[instrument(skip(self))]
    async fn set_primary(&self, tariff_id: TariffId, host_id: UserId) -> Result<Tariff, PortError> {
        Ok(self.set_primary_locked(tariff_id, host_id).await??)
    }

    #[instrument(skip(self))]
    async fn delete_tariff(&self, tariff_id: TariffId, host_id: UserId) -> Result<DeleteOutcome, PortError> {
        Ok(self.delete_guarded(tariff_id, host_id).await?)
    }

    async fn get_tariff(&self, tariff_id: TariffId) -> Result<Option<Tariff>, PortError> {
        Ok(self.fetch_one(tariff_id).await?)
    }

    async fn list_tariffs(&self, host_id: UserId) -> Result<Vec<Tariff>, PortError> {
        Ok(self.fetch_for_host(host_id).await?)
    }

    async fn hosts_in_price_range(&self, range: PriceRange) -> Result<Vec<UserId>, PortError> {
        Ok(self.fetch_hosts_in_range(range).await?)
    }
}
