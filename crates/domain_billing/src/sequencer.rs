//! Invoice sequencer
//!
//! Numbers come from a per-year counter that the store increments inside the
//! invoice-insert transaction. Writers that collide get
//! `PortError::Contention`; the sequencer retries those with a short backoff
//! and never reports them to callers unless every attempt failed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};

use core_kernel::{InvoiceId, PortError, UserId};
use domain_booking::Booking;

use crate::error::BillingError;
use crate::invoice::{Invoice, InvoiceNumber, NewInvoice};
use crate::payment::{Payment, PaymentStatus};
use crate::ports::{InvoicePort, IssueOutcome};

pub const DEFAULT_INVOICE_PREFIX: &str = "INV";

const MAX_ATTEMPTS: u32 = 5;
const BASE_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Clone)]
pub struct InvoiceSequencer {
    port: Arc<dyn InvoicePort>,
    prefix: String,
}

impl InvoiceSequencer {
    pub fn new(port: Arc<dyn InvoicePort>) -> Self {
        Self {
            port,
            prefix: DEFAULT_INVOICE_PREFIX.to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Allocates the next number for `year`
    #[instrument(skip(self))]
    pub async fn next(&self, year: i32) -> Result<InvoiceNumber, BillingError> {
        let seq = retry_contention("next_invoice_number", || self.port.next_sequence(year)).await?;
        InvoiceNumber::new(self.prefix.clone(), year, seq)
    }

    /// Issues the invoice for a succeeded payment, or returns the one that
    /// already exists
    #[instrument(skip(self, payment, booking), fields(payment_id = %payment.id, booking_id = %booking.id))]
    pub async fn issue_for(
        &self,
        payment: &Payment,
        booking: &Booking,
        issue_date: NaiveDate,
    ) -> Result<IssueOutcome, BillingError> {
        if payment.status != PaymentStatus::Succeeded {
            return Err(BillingError::invalid_state(format!(
                "payment {} is {}, invoices are issued for succeeded payments",
                payment.id, payment.status
            )));
        }
        if payment.booking_id != booking.id {
            return Err(BillingError::validation("payment does not belong to booking"));
        }

        let new_invoice = NewInvoice {
            payment_id: payment.id,
            booking_id: booking.id,
            user_id: booking.guest_id,
            host_id: booking.host_id,
            issue_date,
            settlement: payment.settlement(),
        };

        let outcome = retry_contention("issue_invoice", || {
            self.port.issue_invoice(new_invoice.clone(), &self.prefix)
        })
        .await?;

        match &outcome {
            IssueOutcome::Issued(invoice) => {
                info!(invoice_number = %invoice.invoice_number, "Invoice issued")
            }
            IssueOutcome::Existing(invoice) => {
                debug!(invoice_number = %invoice.invoice_number, "Invoice already issued")
            }
        }
        Ok(outcome)
    }

    /// Reads an invoice the actor is guest or host of
    pub async fn get(&self, invoice_id: InvoiceId, actor_id: UserId) -> Result<Invoice, BillingError> {
        let invoice = self
            .port
            .get_invoice(invoice_id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("Invoice {}", invoice_id)))?;
        if !invoice.is_visible_to(actor_id) {
            return Err(BillingError::Forbidden(format!("invoice {}", invoice_id)));
        }
        Ok(invoice)
    }

    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Invoice>, BillingError> {
        Ok(self.port.list_invoices_for_user(user_id).await?)
    }

    /// Counts a download by the guest or host
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn record_download(&self, invoice_id: InvoiceId, actor_id: UserId) -> Result<Invoice, BillingError> {
        self.get(invoice_id, actor_id).await?;
        self.port
            .record_download(invoice_id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("Invoice {}", invoice_id)))
    }
}

/// Runs `op` until it stops failing with contention
async fn retry_contention<T, F, Fut>(operation: &str, mut op: F) -> Result<T, PortError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PortError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(PortError::Contention { .. }) if attempt < MAX_ATTEMPTS => {
                warn!(operation, attempt, "Invoice sequence contention, retrying");
                tokio::time::sleep(BASE_BACKOFF * attempt).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
