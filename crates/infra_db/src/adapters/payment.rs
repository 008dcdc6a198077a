//! PostgreSQL payment adapter

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use core_kernel::{BookingId, DomainPort, PaymentId, PortError};
use domain_billing::{FeeSplit, Payment, PaymentChange, PaymentPort, PaymentStatus, RearmPayment};

use super::money;
use crate::error::DatabaseError;

const PAYMENT_COLUMNS: &str = "id, booking_id, processor_intent_id, amount, commission, vat, host_amount, currency, \
     destination_account, application_fee, status, failure_reason, attempts, created_at, updated_at";

const ONE_PER_BOOKING: &str = "payments_one_per_booking";

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    booking_id: Uuid,
    processor_intent_id: String,
    amount: Decimal,
    commission: Decimal,
    vat: Decimal,
    host_amount: Decimal,
    currency: String,
    destination_account: Option<String>,
    application_fee: Option<Decimal>,
    status: String,
    failure_reason: Option<String>,
    attempts: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let fee_split = match (row.destination_account, row.application_fee) {
            (Some(destination_account), Some(fee)) => Some(FeeSplit {
                destination_account,
                application_fee: money(fee, &row.currency)?,
            }),
            (None, None) => None,
            _ => return Err(DatabaseError::decode("payment fee split is half populated")),
        };
        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            booking_id: BookingId::from_uuid(row.booking_id),
            processor_intent_id: row.processor_intent_id,
            amount: money(row.amount, &row.currency)?,
            commission: money(row.commission, &row.currency)?,
            vat: money(row.vat, &row.currency)?,
            host_amount: money(row.host_amount, &row.currency)?,
            fee_split,
            status: row
                .status
                .parse::<PaymentStatus>()
                .map_err(|e| DatabaseError::decode(e.to_string()))?,
            failure_reason: row.failure_reason,
            attempts: u32::try_from(row.attempts)
                .map_err(|_| DatabaseError::decode(format!("negative attempts: {}", row.attempts)))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// PostgreSQL implementation of `PaymentPort`
#[derive(Debug, Clone)]
pub struct PostgresPaymentAdapter {
    pool: PgPool,
}

impl PostgresPaymentAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(&self, payment: &Payment) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, booking_id, processor_intent_id, amount, commission, vat, host_amount,
                                  currency, destination_account, application_fee, status, failure_reason,
                                  attempts, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.booking_id.as_uuid())
        .bind(&payment.processor_intent_id)
        .bind(payment.amount.amount())
        .bind(payment.commission.amount())
        .bind(payment.vat.amount())
        .bind(payment.host_amount.amount())
        .bind(payment.amount.currency().code())
        .bind(payment.fee_split.as_ref().map(|f| f.destination_account.as_str()))
        .bind(payment.fee_split.as_ref().map(|f| f.application_fee.amount()))
        .bind(payment.status.as_str())
        .bind(payment.failure_reason.as_deref())
        .bind(payment.attempts as i32)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_where(&self, column: &str, id: &Uuid) -> Result<Option<Payment>, DatabaseError> {
        let sql = format!("SELECT {} FROM payments WHERE {} = $1", PAYMENT_COLUMNS, column);
        let row: Option<PaymentRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(Payment::try_from).transpose()
    }

    async fn exists(&self, payment_id: PaymentId) -> Result<bool, DatabaseError> {
        Ok(sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM payments WHERE id = $1)")
            .bind(payment_id.as_uuid())
            .fetch_one(&self.pool)
            .await?)
    }

    async fn compare_and_set(&self, change: &PaymentChange) -> Result<Option<Payment>, DatabaseError> {
        let from: Vec<&str> = change.from.iter().map(|s| s.as_str()).collect();
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            r#"
            UPDATE payments
            SET status = $3, failure_reason = $4, updated_at = $5
            WHERE id = $1 AND status = ANY($2)
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(change.payment_id.as_uuid())
        .bind(&from)
        .bind(change.to.as_str())
        .bind(change.failure_reason.as_deref())
        .bind(change.at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Payment::try_from(row)?)),
            None if self.exists(change.payment_id).await? => Ok(None),
            None => Err(DatabaseError::not_found("Payment", change.payment_id)),
        }
    }

    async fn fetch_by_intent(&self, intent_id: &str) -> Result<Option<Payment>, DatabaseError> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM payments
            WHERE processor_intent_id = $1
               OR id = (SELECT payment_id FROM superseded_intents WHERE intent_id = $1)
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Payment::try_from).transpose()
    }

    async fn rearm(&self, rearm: &RearmPayment) -> Result<Option<Payment>, DatabaseError> {
        let settlement = &rearm.settlement;
        let mut tx = self.pool.begin().await?;
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            r#"
            UPDATE payments
            SET processor_intent_id = $3,
                amount = $4, commission = $5, vat = $6, host_amount = $7, currency = $8,
                destination_account = $9, application_fee = $10,
                status = 'pending', failure_reason = NULL,
                attempts = attempts + 1, updated_at = $11
            WHERE id = $1 AND status = 'failed' AND processor_intent_id = $2
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
        ))
        .bind(rearm.payment_id.as_uuid())
        .bind(&rearm.previous_intent_id)
        .bind(&rearm.intent_id)
        .bind(settlement.gross.amount())
        .bind(settlement.commission.amount())
        .bind(settlement.vat.amount())
        .bind(settlement.host_amount.amount())
        .bind(settlement.gross.currency().code())
        .bind(rearm.fee_split.as_ref().map(|f| f.destination_account.as_str()))
        .bind(rearm.fee_split.as_ref().map(|f| f.application_fee.amount()))
        .bind(rearm.at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return if self.exists(rearm.payment_id).await? {
                Ok(None)
            } else {
                Err(DatabaseError::not_found("Payment", rearm.payment_id))
            };
        };

        sqlx::query("INSERT INTO superseded_intents (intent_id, payment_id, superseded_at) VALUES ($1, $2, $3)")
            .bind(&rearm.previous_intent_id)
            .bind(rearm.payment_id.as_uuid())
            .bind(rearm.at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(Payment::try_from(row)?))
    }
}

impl DomainPort for PostgresPaymentAdapter {}

#[async_trait]
impl PaymentPort for PostgresPaymentAdapter {
    #[instrument(skip(self, payment), fields(payment_id = %payment.id, booking_id = %payment.booking_id))]
    async fn insert_payment(&self, payment: Payment) -> Result<Payment, PortError> {
        match self.insert(&payment).await {
            Ok(()) => Ok(payment),
            Err(e) if e.is_duplicate_of(ONE_PER_BOOKING) => Err(PortError::conflict("booking already has a payment")),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>, PortError> {
        Ok(self.fetch_where("id", payment_id.as_uuid()).await?)
    }

    async fn get_payment_for_booking(&self, booking_id: BookingId) -> Result<Option<Payment>, PortError> {
        Ok(self.fetch_where("booking_id", booking_id.as_uuid()).await?)
    }

    async fn get_payment_by_intent(&self, intent_id: &str) -> Result<Option<Payment>, PortError> {
        Ok(self.fetch_by_intent(intent_id).await?)
    }

    #[instrument(skip(self, change), fields(payment_id = %change.payment_id, to = %change.to))]
    async fn transition_payment(&self, change: PaymentChange) -> Result<Option<Payment>, PortError> {
        match self.compare_and_set(&change).await {
            Err(DatabaseError::NotFound(_)) => Err(PortError::not_found("Payment", change.payment_id)),
            other => Ok(other?),
        }
    }

    #[instrument(skip(self, rearm), fields(payment_id = %rearm.payment_id))]
    async fn rearm_payment(&self, rearm: RearmPayment) -> Result<Option<Payment>, PortError> {
        match self.rearm(&rearm).await {
            Err(DatabaseError::NotFound(_)) => Err(PortError::not_found("Payment", rearm.payment_id)),
            other => Ok(other?),
        }
    }
}
