//! Billing Domain Ports
//!
//! - [`PaymentPort`]: payments, unique per booking, with status CAS
//! - [`InvoicePort`]: per-year counter and invoice insert in one transaction
//! - [`WebhookLedgerPort`]: event-id ledger for at-least-once delivery

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use core_kernel::{BookingId, DomainPort, InvoiceId, PaymentId, PortError, UserId};

use crate::commission::Settlement;
use crate::invoice::{Invoice, InvoiceNumber, NewInvoice};
use crate::payment::{FeeSplit, Payment, PaymentStatus};

/// Compare-and-swap on a payment's status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentChange {
    pub payment_id: PaymentId,
    pub from: Vec<PaymentStatus>,
    pub to: PaymentStatus,
    pub failure_reason: Option<String>,
    pub at: DateTime<Utc>,
}

impl PaymentChange {
    /// pending|failed -> succeeded
    pub fn succeeded(payment_id: PaymentId, at: DateTime<Utc>) -> Self {
        Self {
            payment_id,
            from: vec![PaymentStatus::Pending, PaymentStatus::Failed],
            to: PaymentStatus::Succeeded,
            failure_reason: None,
            at,
        }
    }

    /// pending -> failed
    pub fn failed(payment_id: PaymentId, reason: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            payment_id,
            from: vec![PaymentStatus::Pending],
            to: PaymentStatus::Failed,
            failure_reason: reason,
            at,
        }
    }
}

/// Points a failed payment at a new intent and puts it back to pending.
/// The previous intent stays resolvable through `get_payment_by_intent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RearmPayment {
    pub payment_id: PaymentId,
    /// Intent the row must still reference
    pub previous_intent_id: String,
    pub intent_id: String,
    pub settlement: Settlement,
    pub fee_split: Option<FeeSplit>,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait PaymentPort: DomainPort {
    /// # Errors
    ///
    /// `PortError::Conflict` when the booking already has a payment
    async fn insert_payment(&self, payment: Payment) -> Result<Payment, PortError>;

    async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>, PortError>;

    async fn get_payment_for_booking(&self, booking_id: BookingId) -> Result<Option<Payment>, PortError>;

    /// Resolves the current intent and every intent the payment was
    /// re-armed away from
    async fn get_payment_by_intent(&self, intent_id: &str) -> Result<Option<Payment>, PortError>;

    /// Applies `change` if the stored status is in `change.from`; `None` otherwise
    async fn transition_payment(&self, change: PaymentChange) -> Result<Option<Payment>, PortError>;

    /// Re-arms a failed payment, bumps its attempt count and records
    /// `previous_intent_id` as superseded, all in one write; `None` if it is
    /// no longer failed on `previous_intent_id`
    async fn rearm_payment(&self, rearm: RearmPayment) -> Result<Option<Payment>, PortError>;
}

/// Result of issuing an invoice for a payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    /// This call allocated a number and inserted the invoice
    Issued(Invoice),
    /// The payment already had an invoice; no number was consumed
    Existing(Invoice),
}

impl IssueOutcome {
    pub fn invoice(&self) -> &Invoice {
        match self {
            IssueOutcome::Issued(invoice) | IssueOutcome::Existing(invoice) => invoice,
        }
    }

    pub fn into_invoice(self) -> Invoice {
        match self {
            IssueOutcome::Issued(invoice) | IssueOutcome::Existing(invoice) => invoice,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, IssueOutcome::Issued(_))
    }
}

#[async_trait]
pub trait InvoicePort: DomainPort {
    /// Increments and returns the counter for `year`
    ///
    /// # Errors
    ///
    /// `PortError::Contention` when concurrent writers collided; retryable
    async fn next_sequence(&self, year: i32) -> Result<u64, PortError>;

    /// Allocates the next number for the invoice's year and inserts the
    /// invoice in the same transaction, or returns the payment's existing
    /// invoice
    async fn issue_invoice(&self, invoice: NewInvoice, prefix: &str) -> Result<IssueOutcome, PortError>;

    async fn get_invoice(&self, invoice_id: InvoiceId) -> Result<Option<Invoice>, PortError>;

    async fn get_invoice_for_payment(&self, payment_id: PaymentId) -> Result<Option<Invoice>, PortError>;

    async fn find_invoice_by_number(&self, number: &InvoiceNumber) -> Result<Option<Invoice>, PortError>;

    /// Invoices where the user is guest or host, newest first
    async fn list_invoices_for_user(&self, user_id: UserId) -> Result<Vec<Invoice>, PortError>;

    /// Atomically increments the download counter
    async fn record_download(&self, invoice_id: InvoiceId) -> Result<Option<Invoice>, PortError>;
}

/// Result of claiming a webhook event id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClaim {
    /// First delivery of this event
    Fresh,
    /// Claimed before but not finished; `attempts` includes this one
    Retry { attempts: u32 },
    /// Already processed; acknowledge without side effects
    AlreadyProcessed,
}

#[async_trait]
pub trait WebhookLedgerPort: DomainPort {
    async fn claim_event(&self, event_id: &str, event_type: &str) -> Result<EventClaim, PortError>;

    async fn mark_processed(&self, event_id: &str, at: DateTime<Utc>) -> Result<(), PortError>;
}

/// In-memory implementations of the billing ports for unit tests
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[derive(Debug, Default, Clone)]
    pub struct MockPaymentPort {
        payments: Arc<RwLock<HashMap<PaymentId, Payment>>>,
        superseded: Arc<RwLock<HashMap<String, PaymentId>>>,
    }

    impl MockPaymentPort {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl DomainPort for MockPaymentPort {}

    #[async_trait]
    impl PaymentPort for MockPaymentPort {
        async fn insert_payment(&self, payment: Payment) -> Result<Payment, PortError> {
            let mut payments = self.payments.write().await;
            if payments.values().any(|p| p.booking_id == payment.booking_id) {
                return Err(PortError::conflict("booking already has a payment"));
            }
            payments.insert(payment.id, payment.clone());
            Ok(payment)
        }

        async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>, PortError> {
            Ok(self.payments.read().await.get(&payment_id).cloned())
        }

        async fn get_payment_for_booking(&self, booking_id: BookingId) -> Result<Option<Payment>, PortError> {
            Ok(self.payments.read().await.values().find(|p| p.booking_id == booking_id).cloned())
        }

        async fn get_payment_by_intent(&self, intent_id: &str) -> Result<Option<Payment>, PortError> {
            let payments = self.payments.read().await;
            if let Some(current) = payments.values().find(|p| p.processor_intent_id == intent_id) {
                return Ok(Some(current.clone()));
            }
            let superseded = self.superseded.read().await;
            Ok(superseded.get(intent_id).and_then(|id| payments.get(id)).cloned())
        }

        async fn transition_payment(&self, change: PaymentChange) -> Result<Option<Payment>, PortError> {
            let mut payments = self.payments.write().await;
            let payment = payments
                .get_mut(&change.payment_id)
                .ok_or_else(|| PortError::not_found("Payment", change.payment_id))?;
            if !change.from.contains(&payment.status) {
                return Ok(None);
            }
            payment.status = change.to;
            payment.failure_reason = change.failure_reason;
            payment.updated_at = change.at;
            Ok(Some(payment.clone()))
        }

        async fn rearm_payment(&self, rearm: RearmPayment) -> Result<Option<Payment>, PortError> {
            let mut payments = self.payments.write().await;
            let payment = payments
                .get_mut(&rearm.payment_id)
                .ok_or_else(|| PortError::not_found("Payment", rearm.payment_id))?;
            if payment.status != PaymentStatus::Failed || payment.processor_intent_id != rearm.previous_intent_id {
                return Ok(None);
            }
            self.superseded
                .write()
                .await
                .insert(rearm.previous_intent_id, payment.id);
            payment.processor_intent_id = rearm.intent_id;
            payment.amount = rearm.settlement.gross;
            payment.commission = rearm.settlement.commission;
            payment.vat = rearm.settlement.vat;
            payment.host_amount = rearm.settlement.host_amount;
            payment.fee_split = rearm.fee_split;
            payment.status = PaymentStatus::Pending;
            payment.failure_reason = None;
            payment.attempts += 1;
            payment.updated_at = rearm.at;
            Ok(Some(payment.clone()))
        }
    }

    #[derive(Debug, Default)]
    struct InvoiceState {
        counters: BTreeMap<i32, u64>,
        invoices: HashMap<InvoiceId, Invoice>,
    }

    #[derive(Debug, Default, Clone)]
    pub struct MockInvoicePort {
        state: Arc<RwLock<InvoiceState>>,
    }

    impl MockInvoicePort {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl DomainPort for MockInvoicePort {}

    #[async_trait]
    impl InvoicePort for MockInvoicePort {
        async fn next_sequence(&self, year: i32) -> Result<u64, PortError> {
            let mut state = self.state.write().await;
            let counter = state.counters.entry(year).or_insert(0);
            *counter += 1;
            Ok(*counter)
        }

        async fn issue_invoice(&self, invoice: NewInvoice, prefix: &str) -> Result<IssueOutcome, PortError> {
            let mut state = self.state.write().await;
            if let Some(existing) = state.invoices.values().find(|i| i.payment_id == invoice.payment_id) {
                return Ok(IssueOutcome::Existing(existing.clone()));
            }
            let year = invoice.year();
            let counter = state.counters.entry(year).or_insert(0);
            *counter += 1;
            let number = InvoiceNumber::new(prefix, year, *counter).map_err(|e| PortError::validation(e.to_string()))?;
            let issued = Invoice::issue(invoice, number, chrono::Utc::now());
            state.invoices.insert(issued.id, issued.clone());
            Ok(IssueOutcome::Issued(issued))
        }

        async fn get_invoice(&self, invoice_id: InvoiceId) -> Result<Option<Invoice>, PortError> {
            Ok(self.state.read().await.invoices.get(&invoice_id).cloned())
        }

        async fn get_invoice_for_payment(&self, payment_id: PaymentId) -> Result<Option<Invoice>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .invoices
                .values()
                .find(|i| i.payment_id == payment_id)
                .cloned())
        }

        async fn find_invoice_by_number(&self, number: &InvoiceNumber) -> Result<Option<Invoice>, PortError> {
            Ok(self
                .state
                .read()
                .await
                .invoices
                .values()
                .find(|i| &i.invoice_number == number)
                .cloned())
        }

        async fn list_invoices_for_user(&self, user_id: UserId) -> Result<Vec<Invoice>, PortError> {
            let state = self.state.read().await;
            let mut mine: Vec<Invoice> = state.invoices.values().filter(|i| i.is_visible_to(user_id)).cloned().collect();
            mine.sort_by(|a, b| b.invoice_number.cmp(&a.invoice_number));
            Ok(mine)
        }

        async fn record_download(&self, invoice_id: InvoiceId) -> Result<Option<Invoice>, PortError> {
            let mut state = self.state.write().await;
            Ok(state.invoices.get_mut(&invoice_id).map(|invoice| {
                invoice.download_count += 1;
                invoice.clone()
            }))
        }
    }

    #[derive(Debug, Default, Clone)]
    pub struct MockWebhookLedger {
        events: Arc<RwLock<HashMap<String, (u32, bool)>>>,
    }

    impl MockWebhookLedger {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn attempts(&self, event_id: &str) -> u32 {
            self.events.read().await.get(event_id).map(|(attempts, _)| *attempts).unwrap_or(0)
        }
    }

    impl DomainPort for MockWebhookLedger {}

    #[async_trait]
    impl WebhookLedgerPort for MockWebhookLedger {
        async fn claim_event(&self, event_id: &str, _event_type: &str) -> Result<EventClaim, PortError> {
            let mut events = self.events.write().await;
            let entry = events.entry(event_id.to_string()).or_insert((0, false));
            entry.0 += 1;
            Ok(match *entry {
                (_, true) => EventClaim::AlreadyProcessed,
                (1, false) => EventClaim::Fresh,
                (attempts, false) => EventClaim::Retry { attempts },
            })
        }

        async fn mark_processed(&self, event_id: &str, _at: DateTime<Utc>) -> Result<(), PortError> {
            let mut events = self.events.write().await;
            let entry = events.entry(event_id.to_string()).or_insert((1, false));
            entry.1 = true;
            Ok(())
        }
    }
}
