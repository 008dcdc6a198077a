//! In-memory store
//!
//! A single-process implementation of every storage port, used by the
//! `memory` backend of the API server and by the test harness. All state
//! sits behind one async `RwLock`. Every mutating port method holds the
//! write half for its whole body, so the unique rules the database enforces
//! with indexes (one open booking per slot, one payment per booking, one
//! invoice per payment, gap-free invoice numbers) are checked inside the same
//! critical section. Reads share the read half and only wait for a writer
//! that is already inside.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use core_kernel::{
    BookingId, DomainPort, HealthCheckResult, HealthCheckable, InvoiceId, PaymentId, PortError, TariffId, UserId,
};
use domain_billing::{
    EventClaim, Invoice, InvoiceNumber, InvoicePort, IssueOutcome, NewInvoice, Payment, PaymentChange, PaymentPort,
    PaymentStatus, RearmPayment, WebhookLedgerPort,
};
use domain_booking::{Booking, BookingPort, BookingStatus, StatusChange};
use domain_pricing::{
    DeleteOutcome, HostSchedule, PriceRange, Tariff, TariffPort, UpsertOutcome, UpsertTariff,
};
use domain_verification::{
    HostVerification, VerificationDocument, VerificationPort, VerificationStatus, VerificationWrite,
};

#[derive(Debug, Default)]
struct LedgerEntry {
    attempts: u32,
    processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    schedules: HashMap<UserId, HostSchedule>,
    bookings: HashMap<BookingId, Booking>,
    verifications: HashMap<UserId, HostVerification>,
    documents: Vec<VerificationDocument>,
    payments: HashMap<PaymentId, Payment>,
    /// Intents a payment was re-armed away from
    superseded_intents: HashMap<String, PaymentId>,
    counters: BTreeMap<i32, u64>,
    invoices: HashMap<InvoiceId, Invoice>,
    webhook_events: HashMap<String, LedgerEntry>,
}

impl MemoryState {
    fn tariff_referenced(&self, tariff_id: TariffId) -> bool {
        self.bookings
            .values()
            .any(|b| b.tariff_id == tariff_id && b.status != BookingStatus::Cancelled)
    }
}

/// Every storage port over shared in-process state
///
/// Cloning is cheap and clones share state, so one store can be handed to
/// each service as a separate `Arc<dyn Port>`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DomainPort for InMemoryStore {}

#[async_trait]
impl HealthCheckable for InMemoryStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("memory")
    }
}

#[async_trait]
impl TariffPort for InMemoryStore {
    async fn upsert_tariff(&self, request: UpsertTariff) -> Result<UpsertOutcome, PortError> {
        let mut state = self.state.write().await;
        let schedule = state
            .schedules
            .entry(request.host_id)
            .or_insert_with(|| HostSchedule::new(request.host_id));
        Ok(schedule.upsert(request.duration_minutes, request.fields, request.max_active, Utc::now()))
    }

    async fn set_primary(&self, tariff_id: TariffId, host_id: UserId) -> Result<Tariff, PortError> {
        let mut state = self.state.write().await;
        let schedule = state
            .schedules
            .get_mut(&host_id)
            .ok_or_else(|| PortError::not_found("Tariff", tariff_id))?;
        Ok(schedule.set_primary(tariff_id, Utc::now())?)
    }

    async fn delete_tariff(&self, tariff_id: TariffId, host_id: UserId) -> Result<DeleteOutcome, PortError> {
        let mut state = self.state.write().await;
        let owned = state
            .schedules
            .get(&host_id)
            .is_some_and(|s| s.get(tariff_id).is_some());
        if !owned {
            return Ok(DeleteOutcome::NotFound);
        }
        if state.tariff_referenced(tariff_id) {
            return Ok(DeleteOutcome::Referenced);
        }
        if let Some(schedule) = state.schedules.get_mut(&host_id) {
            schedule.remove(tariff_id);
        }
        Ok(DeleteOutcome::Deleted)
    }

    async fn get_tariff(&self, tariff_id: TariffId) -> Result<Option<Tariff>, PortError> {
        let state = self.state.read().await;
        Ok(state.schedules.values().find_map(|s| s.get(tariff_id).cloned()))
    }

    async fn list_tariffs(&self, host_id: UserId) -> Result<Vec<Tariff>, PortError> {
        let state = self.state.read().await;
        Ok(state.schedules.get(&host_id).map(|s| s.tariffs()).unwrap_or_default())
    }

    async fn hosts_in_price_range(&self, range: PriceRange) -> Result<Vec<UserId>, PortError> {
        let state = self.state.read().await;
        let mut hosts: Vec<UserId> = state
            .schedules
            .values()
            .filter(|s| s.tariffs().iter().any(|t| t.is_active && range.contains(&t.price)))
            .map(|s| s.host_id())
            .collect();
        hosts.sort_by_key(|h| *h.as_uuid());
        Ok(hosts)
    }
}

#[async_trait]
impl BookingPort for InMemoryStore {
    async fn insert_booking(&self, booking: Booking) -> Result<Booking, PortError> {
        let mut state = self.state.write().await;
        let slot = booking.slot();
        if state.bookings.values().any(|b| b.status.is_open() && b.slot() == slot) {
            return Err(PortError::conflict("slot already booked"));
        }
        state.bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn get_booking(&self, booking_id: BookingId) -> Result<Option<Booking>, PortError> {
        Ok(self.state.read().await.bookings.get(&booking_id).cloned())
    }

    async fn transition_status(&self, change: StatusChange) -> Result<Option<Booking>, PortError> {
        let mut state = self.state.write().await;
        let booking = state
            .bookings
            .get_mut(&change.booking_id)
            .ok_or_else(|| PortError::not_found("Booking", change.booking_id))?;
        if !change.from.contains(&booking.status) {
            return Ok(None);
        }
        booking.status = change.to;
        if change.cancelled_by.is_some() {
            booking.cancelled_by = change.cancelled_by;
        }
        booking.updated_at = change.at;
        Ok(Some(booking.clone()))
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, PortError> {
        let state = self.state.read().await;
        let mut mine: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.host_id == user_id || b.guest_id == user_id)
            .cloned()
            .collect();
        mine.sort_by(|a, b| (b.scheduled_date, b.start_time).cmp(&(a.scheduled_date, a.start_time)));
        Ok(mine)
    }
}

#[async_trait]
impl VerificationPort for InMemoryStore {
    async fn get_verification(&self, user_id: UserId) -> Result<Option<HostVerification>, PortError> {
        Ok(self.state.read().await.verifications.get(&user_id).cloned())
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<HostVerification>, PortError> {
        let state = self.state.read().await;
        Ok(state
            .verifications
            .values()
            .find(|r| r.activation_token.as_deref() == Some(token))
            .cloned())
    }

    async fn find_by_connected_account(&self, account_id: &str) -> Result<Option<HostVerification>, PortError> {
        let state = self.state.read().await;
        Ok(state
            .verifications
            .values()
            .find(|r| r.connected_account_id.as_deref() == Some(account_id))
            .cloned())
    }

    async fn write_verification(&self, write: VerificationWrite) -> Result<HostVerification, PortError> {
        let mut state = self.state.write().await;
        let user_id = write.record.user_id;
        let current = state
            .verifications
            .get(&user_id)
            .map(|r| r.status)
            .unwrap_or(VerificationStatus::Unregistered);
        if current != write.expected {
            return Err(PortError::conflict(format!(
                "verification for {} is {}, expected {}",
                user_id, current, write.expected
            )));
        }
        if let Some(account) = write.record.connected_account_id.as_deref() {
            let taken = state
                .verifications
                .values()
                .any(|r| r.user_id != user_id && r.connected_account_id.as_deref() == Some(account));
            if taken {
                return Err(PortError::conflict(format!("account {} is linked to another host", account)));
            }
        }

        state.documents.extend(write.new_documents);
        if let Some(stamp) = write.stamp {
            for document in state.documents.iter_mut().filter(|d| d.user_id == user_id) {
                document.stamp(stamp.decision, stamp.reviewer, stamp.at);
            }
        }
        state.verifications.insert(user_id, write.record.clone());
        Ok(write.record)
    }

    async fn list_documents(&self, user_id: UserId) -> Result<Vec<VerificationDocument>, PortError> {
        let state = self.state.read().await;
        Ok(state.documents.iter().filter(|d| d.user_id == user_id).cloned().collect())
    }
}

#[async_trait]
impl PaymentPort for InMemoryStore {
    async fn insert_payment(&self, payment: Payment) -> Result<Payment, PortError> {
        let mut state = self.state.write().await;
        if state.payments.values().any(|p| p.booking_id == payment.booking_id) {
            return Err(PortError::conflict("booking already has a payment"));
        }
        state.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>, PortError> {
        Ok(self.state.read().await.payments.get(&payment_id).cloned())
    }

    async fn get_payment_for_booking(&self, booking_id: BookingId) -> Result<Option<Payment>, PortError> {
        let state = self.state.read().await;
        Ok(state.payments.values().find(|p| p.booking_id == booking_id).cloned())
    }

    async fn get_payment_by_intent(&self, intent_id: &str) -> Result<Option<Payment>, PortError> {
        let state = self.state.read().await;
        if let Some(current) = state.payments.values().find(|p| p.processor_intent_id == intent_id) {
            return Ok(Some(current.clone()));
        }
        Ok(state
            .superseded_intents
            .get(intent_id)
            .and_then(|id| state.payments.get(id))
            .cloned())
    }

    async fn transition_payment(&self, change: PaymentChange) -> Result<Option<Payment>, PortError> {
        let mut state = self.state.write().await;
        let payment = state
            .payments
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
        let mut state = self.state.write().await;
        let MemoryState {
            payments,
            superseded_intents,
            ..
        } = &mut *state;
        let payment = payments
            .get_mut(&rearm.payment_id)
            .ok_or_else(|| PortError::not_found("Payment", rearm.payment_id))?;
        if payment.status != PaymentStatus::Failed || payment.processor_intent_id != rearm.previous_intent_id {
            return Ok(None);
        }
        superseded_intents.insert(rearm.previous_intent_id, payment.id);
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

#[async_trait]
impl InvoicePort for InMemoryStore {
    async fn next_sequence(&self, year: i32) -> Result<u64, PortError> {
        let mut state = self.state.write().await;
        let counter = state.counters.entry(year).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn issue_invoice(&self, invoice: NewInvoice, prefix: &str) -> Result<IssueOutcome, PortError> {
        let mut state = self.state.write().await;
        if !state.payments.contains_key(&invoice.payment_id) {
            return Err(PortError::not_found("Payment", invoice.payment_id));
        }
        if let Some(existing) = state.invoices.values().find(|i| i.payment_id == invoice.payment_id) {
            return Ok(IssueOutcome::Existing(existing.clone()));
        }

        let year = invoice.year();
        let seq = state.counters.get(&year).copied().unwrap_or(0) + 1;
        let number = InvoiceNumber::new(prefix, year, seq).map_err(|e| PortError::validation(e.to_string()))?;
        state.counters.insert(year, seq);
        let issued = Invoice::issue(invoice, number, Utc::now());
        state.invoices.insert(issued.id, issued.clone());
        Ok(IssueOutcome::Issued(issued))
    }

    async fn get_invoice(&self, invoice_id: InvoiceId) -> Result<Option<Invoice>, PortError> {
        Ok(self.state.read().await.invoices.get(&invoice_id).cloned())
    }

    async fn get_invoice_for_payment(&self, payment_id: PaymentId) -> Result<Option<Invoice>, PortError> {
        let state = self.state.read().await;
        Ok(state.invoices.values().find(|i| i.payment_id == payment_id).cloned())
    }

    async fn find_invoice_by_number(&self, number: &InvoiceNumber) -> Result<Option<Invoice>, PortError> {
        let state = self.state.read().await;
        Ok(state.invoices.values().find(|i| &i.invoice_number == number).cloned())
    }

    async fn list_invoices_for_user(&self, user_id: UserId) -> Result<Vec<Invoice>, PortError> {
        let state = self.state.read().await;
        let mut mine: Vec<Invoice> = state
            .invoices
            .values()
            .filter(|i| i.is_visible_to(user_id))
            .cloned()
            .collect();
        mine.sort_by(|a, b| (b.issue_date, &b.invoice_number).cmp(&(a.issue_date, &a.invoice_number)));
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

#[async_trait]
impl WebhookLedgerPort for InMemoryStore {
    async fn claim_event(&self, event_id: &str, _event_type: &str) -> Result<EventClaim, PortError> {
        let mut state = self.state.write().await;
        let entry = state.webhook_events.entry(event_id.to_string()).or_default();
        entry.attempts += 1;
        Ok(match (entry.processed_at, entry.attempts) {
            (Some(_), _) => EventClaim::AlreadyProcessed,
            (None, 1) => EventClaim::Fresh,
            (None, attempts) => EventClaim::Retry { attempts },
        })
    }

    async fn mark_processed(&self, event_id: &str, at: DateTime<Utc>) -> Result<(), PortError> {
        let mut state = self.state.write().await;
        let entry = state
            .webhook_events
            .get_mut(event_id)
            .ok_or_else(|| PortError::not_found("WebhookEvent", event_id))?;
        entry.processed_at = Some(at);
        Ok(())
    }
}
