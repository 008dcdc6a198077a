//! PostgreSQL invoice adapter
//!
//! Number allocation and the invoice insert share one transaction. The
//! payment row is locked first so two reconcilers racing on the same payment
//! serialize, and the loser finds the winner's invoice instead of burning a
//! number. The counter row itself is bumped with an upsert, which takes a row
//! lock for the rest of the transaction: numbers come out gap-free in commit
//! order.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use core_kernel::{BookingId, DomainPort, InvoiceId, PaymentId, PortError, UserId};
use domain_billing::{Invoice, InvoiceNumber, InvoicePort, IssueOutcome, NewInvoice};

use super::money;
use crate::error::DatabaseError;

const INVOICE_COLUMNS: &str = "id, invoice_number, payment_id, booking_id, user_id, host_id, issue_date, amount, \
     commission, vat, host_amount, currency, download_count, created_at";

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    invoice_number: String,
    payment_id: Uuid,
    booking_id: Uuid,
    user_id: Uuid,
    host_id: Uuid,
    issue_date: NaiveDate,
    amount: Decimal,
    commission: Decimal,
    vat: Decimal,
    host_amount: Decimal,
    currency: String,
    download_count: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = DatabaseError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        Ok(Invoice {
            id: InvoiceId::from_uuid(row.id),
            invoice_number: row
                .invoice_number
                .parse::<InvoiceNumber>()
                .map_err(|e| DatabaseError::decode(e.to_string()))?,
            payment_id: PaymentId::from_uuid(row.payment_id),
            booking_id: BookingId::from_uuid(row.booking_id),
            user_id: UserId::from_uuid(row.user_id),
            host_id: UserId::from_uuid(row.host_id),
            issue_date: row.issue_date,
            amount: money(row.amount, &row.currency)?,
            commission: money(row.commission, &row.currency)?,
            vat: money(row.vat, &row.currency)?,
            host_amount: money(row.host_amount, &row.currency)?,
            download_count: u32::try_from(row.download_count)
                .map_err(|_| DatabaseError::decode("negative download count"))?,
            created_at: row.created_at,
        })
    }
}

/// PostgreSQL implementation of `InvoicePort`
#[derive(Debug, Clone)]
pub struct PostgresInvoiceAdapter {
    pool: PgPool,
}

impl PostgresInvoiceAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn bump_counter(tx: &mut Transaction<'_, Postgres>, year: i32) -> Result<u64, DatabaseError> {
        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO invoice_counters (year, last_seq) VALUES ($1, 1)
            ON CONFLICT (year) DO UPDATE SET last_seq = invoice_counters.last_seq + 1
            RETURNING last_seq
            "#,
        )
        .bind(year)
        .fetch_one(&mut **tx)
        .await?;
        u64::try_from(seq).map_err(|_| DatabaseError::decode(format!("negative invoice sequence {}", seq)))
    }

    async fn existing_for_payment(
        tx: &mut Transaction<'_, Postgres>,
        payment_id: PaymentId,
    ) -> Result<Option<Invoice>, DatabaseError> {
        let row: Option<InvoiceRow> =
            sqlx::query_as(&format!("SELECT {} FROM invoices WHERE payment_id = $1", INVOICE_COLUMNS))
                .bind(payment_id.as_uuid())
                .fetch_optional(&mut **tx)
                .await?;
        row.map(Invoice::try_from).transpose()
    }

    async fn sequence(&self, year: i32) -> Result<u64, DatabaseError> {
        let mut tx = self.pool.begin().await?;
        let seq = Self::bump_counter(&mut tx, year).await?;
        tx.commit().await?;
        Ok(seq)
    }

    async fn issue(&self, new: NewInvoice, prefix: &str) -> Result<IssueOutcome, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM payments WHERE id = $1 FOR UPDATE")
            .bind(new.payment_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(DatabaseError::not_found("Payment", new.payment_id));
        }

        if let Some(existing) = Self::existing_for_payment(&mut tx, new.payment_id).await? {
            tx.rollback().await?;
            debug!(invoice_number = %existing.invoice_number, "Payment already invoiced");
            return Ok(IssueOutcome::Existing(existing));
        }

        let year = new.year();
        let seq = Self::bump_counter(&mut tx, year).await?;
        let number = InvoiceNumber::new(prefix, year, seq).map_err(|e| DatabaseError::decode(e.to_string()))?;
        let invoice = Invoice::issue(new, number, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO invoices (id, invoice_number, payment_id, booking_id, user_id, host_id, issue_date,
                                  amount, commission, vat, host_amount, currency, download_count, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(invoice.invoice_number.to_string())
        .bind(invoice.payment_id.as_uuid())
        .bind(invoice.booking_id.as_uuid())
        .bind(invoice.user_id.as_uuid())
        .bind(invoice.host_id.as_uuid())
        .bind(invoice.issue_date)
        .bind(invoice.amount.amount())
        .bind(invoice.commission.amount())
        .bind(invoice.vat.amount())
        .bind(invoice.host_amount.amount())
        .bind(invoice.amount.currency().code())
        .bind(invoice.download_count as i32)
        .bind(invoice.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(IssueOutcome::Issued(invoice))
    }

    async fn fetch_by(&self, column: &str, sql_type: &str, value: &str) -> Result<Option<Invoice>, DatabaseError> {
        let row: Option<InvoiceRow> = sqlx::query_as(&format!(
            "SELECT {} FROM invoices WHERE {} = CAST($1 AS {})",
            INVOICE_COLUMNS, column, sql_type
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Invoice::try_from).transpose()
    }

    async fn fetch_for_user(&self, user_id: UserId) -> Result<Vec<Invoice>, DatabaseError> {
        let rows: Vec<InvoiceRow> = sqlx::query_as(&format!(
            r#"
            SELECT {} FROM invoices
            WHERE user_id = $1 OR host_id = $1
            ORDER BY issue_date DESC, invoice_number DESC
            "#,
            INVOICE_COLUMNS
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Invoice::try_from).collect()
    }

    async fn increment_downloads(&self, invoice_id: InvoiceId) -> Result<Option<Invoice>, DatabaseError> {
        let row: Option<InvoiceRow> = sqlx::query_as(&format!(
            "UPDATE invoices SET download_count = download_count + 1 WHERE id = $1 RETURNING {}",
            INVOICE_COLUMNS
        ))
        .bind(invoice_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Invoice::try_from).transpose()
    }
}

impl DomainPort for PostgresInvoiceAdapter {}

#[async_trait]
impl InvoicePort for PostgresInvoiceAdapter {
    #[instrument(skip(self))]
    async fn next_sequence(&self, year: i32) -> Result<u64, PortError> {
        Ok(self.sequence(year).await?)
    }

    #[instrument(skip(self, invoice), fields(payment_id = %invoice.payment_id))]
    async fn issue_invoice(&self, invoice: NewInvoice, prefix: &str) -> Result<IssueOutcome, PortError> {
        let payment_id = invoice.payment_id;
        match self.issue(invoice, prefix).await {
            Err(DatabaseError::NotFound(_)) => Err(PortError::not_found("Payment", payment_id)),
            other => Ok(other?),
        }
    }

    async fn get_invoice(&self, invoice_id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        Ok(self.fetch_by("id", "uuid", &invoice_id.as_uuid().to_string()).await?)
    }

    async fn get_invoice_for_payment(&self, payment_id: PaymentId) -> Result<Option<Invoice>, PortError> {
        Ok(self.fetch_by("payment_id", "uuid", &payment_id.as_uuid().to_string()).await?)
    }

    async fn find_invoice_by_number(&self, number: &InvoiceNumber) -> Result<Option<Invoice>, PortError> {
        Ok(self.fetch_by("invoice_number", "text", &number.to_string()).await?)
    }

    async fn list_invoices_for_user(&self, user_id: UserId) -> Result<Vec<Invoice>, PortError> {
        Ok(self.fetch_for_user(user_id).await?)
    }

    async fn record_download(&self, invoice_id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        Ok(self.increment_downloads(invoice_id).await?)
    }
}
