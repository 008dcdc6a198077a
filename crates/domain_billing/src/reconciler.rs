//! Webhook reconciliation
//!
//! Deliveries are at least once. Each event id is claimed in the ledger
//! before any work and marked processed after the last step. A redelivery of
//! an unfinished event replays every step; each step is idempotent on its
//! own, so a crash between steps is repaired by the next delivery.
//!
//! | event | effect |
//! |---|---|
//! | `payment_intent.succeeded` | payment succeeded, booking confirmed, invoice issued, both parties notified |
//! | `payment_intent.payment_failed` | payment failed, booking stays pending |
//! | `account.updated` | host approved when payable, payouts disabled otherwise |

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use core_kernel::{BookingParty, Clock, Notification, NotificationPort};
use domain_booking::{Booking, BookingError, BookingService, BookingStatus};
use domain_verification::VerificationService;

use crate::error::BillingError;
use crate::payment::{Payment, PaymentStatus};
use crate::ports::{EventClaim, PaymentChange, PaymentPort, WebhookLedgerPort};
use crate::sequencer::InvoiceSequencer;
use crate::webhook::{EventKind, SignatureVerifier, WebhookEvent};

/// How a verified delivery was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Steps ran to completion
    Processed { event_id: String, event_type: String },
    /// Event id already processed; nothing was done
    Duplicate { event_id: String },
    /// Event type we do not act on; recorded and acknowledged
    Ignored { event_id: String, event_type: String },
}

#[derive(Clone)]
pub struct WebhookReconciler {
    verifier: SignatureVerifier,
    ledger: Arc<dyn WebhookLedgerPort>,
    payments: Arc<dyn PaymentPort>,
    bookings: BookingService,
    sequencer: InvoiceSequencer,
    verification: VerificationService,
    notifier: Arc<dyn NotificationPort>,
    clock: Arc<dyn Clock>,
}

impl WebhookReconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        verifier: SignatureVerifier,
        ledger: Arc<dyn WebhookLedgerPort>,
        payments: Arc<dyn PaymentPort>,
        bookings: BookingService,
        sequencer: InvoiceSequencer,
        verification: VerificationService,
        notifier: Arc<dyn NotificationPort>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            verifier,
            ledger,
            payments,
            bookings,
            sequencer,
            verification,
            notifier,
            clock,
        }
    }

    /// Verifies and applies one delivery
    ///
    /// # Errors
    ///
    /// - `Signature` or `MalformedEvent`: nothing was recorded
    /// - anything else: the event stays claimed but unprocessed and the
    ///   processor's redelivery finishes it
    #[instrument(skip_all, fields(event_id = tracing::field::Empty))]
    pub async fn handle(&self, signature_header: &str, body: &[u8]) -> Result<ReconcileOutcome, BillingError> {
        self.verifier.verify(signature_header, body, self.clock.now())?;
        let event = WebhookEvent::parse(body)?;
        tracing::Span::current().record("event_id", event.id.as_str());

        match self.ledger.claim_event(&event.id, &event.event_type).await? {
            EventClaim::AlreadyProcessed => {
                debug!(event_id = %event.id, "Duplicate webhook delivery acknowledged");
                return Ok(ReconcileOutcome::Duplicate { event_id: event.id });
            }
            EventClaim::Retry { attempts } => {
                info!(event_id = %event.id, attempts, "Resuming unfinished webhook event");
            }
            EventClaim::Fresh => {}
        }

        let known = self.apply(&event).await?;
        self.ledger.mark_processed(&event.id, self.clock.now()).await?;

        Ok(if known {
            info!(event_id = %event.id, event_type = %event.event_type, "Webhook event processed");
            ReconcileOutcome::Processed {
                event_id: event.id,
                event_type: event.event_type,
            }
        } else {
            info!(event_id = %event.id, event_type = %event.event_type, "Unhandled webhook event type acknowledged");
            ReconcileOutcome::Ignored {
                event_id: event.id,
                event_type: event.event_type,
            }
        })
    }

    /// Returns false for event types that are only acknowledged
    async fn apply(&self, event: &WebhookEvent) -> Result<bool, BillingError> {
        match &event.kind {
            EventKind::IntentSucceeded { intent_id } => self.intent_succeeded(intent_id).await?,
            EventKind::IntentFailed { intent_id, reason } => self.intent_failed(intent_id, reason.clone()).await?,
            EventKind::AccountUpdated {
                account_id,
                payouts_enabled,
                charges_enabled,
            } => self.account_updated(account_id, *payouts_enabled && *charges_enabled).await?,
            EventKind::Unknown => return Ok(false),
        }
        Ok(true)
    }

    async fn intent_succeeded(&self, intent_id: &str) -> Result<(), BillingError> {
        let Some(payment) = self.payments.get_payment_by_intent(intent_id).await? else {
            warn!(intent_id, "Success for unknown payment intent");
            return Ok(());
        };
        if payment.processor_intent_id != intent_id {
            warn!(
                intent_id,
                current = %payment.processor_intent_id,
                payment_id = %payment.id,
                "Success on a superseded intent; settling the payment with it"
            );
        }

        let payment = self.mark_succeeded(payment).await?;
        let booking = self.confirm_booking(&payment).await?;

        let issue_date = self.clock.now().date_naive();
        let outcome = self.sequencer.issue_for(&payment, &booking, issue_date).await?;

        if outcome.is_new() && booking.status != BookingStatus::Cancelled {
            let invoice = outcome.invoice();
            for party in [BookingParty::Host, BookingParty::Guest] {
                self.send(Notification::BookingConfirmed {
                    recipient: booking.user_for(party),
                    booking_id: booking.id,
                    invoice_id: invoice.id,
                    invoice_number: invoice.invoice_number.to_string(),
                })
                .await;
            }
        }
        Ok(())
    }

    async fn mark_succeeded(&self, payment: Payment) -> Result<Payment, BillingError> {
        let change = PaymentChange::succeeded(payment.id, self.clock.now());
        if let Some(updated) = self.payments.transition_payment(change).await? {
            info!(payment_id = %updated.id, booking_id = %updated.booking_id, "Payment succeeded");
            return Ok(updated);
        }
        let current = self
            .payments
            .get_payment(payment.id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("Payment {}", payment.id)))?;
        if current.status != PaymentStatus::Succeeded {
            return Err(BillingError::invalid_state(format!(
                "payment {} could not be marked succeeded from {}",
                current.id, current.status
            )));
        }
        Ok(current)
    }

    /// Confirms the paid booking; a booking cancelled meanwhile stays
    /// cancelled and needs a manual refund
    async fn confirm_booking(&self, payment: &Payment) -> Result<Booking, BillingError> {
        match self.bookings.confirm(payment.booking_id).await {
            Ok(booking) => Ok(booking),
            Err(BookingError::InvalidTransition { .. }) => {
                let booking = self.bookings.find(payment.booking_id).await?;
                warn!(
                    booking_id = %booking.id,
                    payment_id = %payment.id,
                    amount = %payment.amount,
                    status = %booking.status,
                    "Payment succeeded for a booking that can no longer be confirmed; refund manually"
                );
                Ok(booking)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn intent_failed(&self, intent_id: &str, reason: Option<String>) -> Result<(), BillingError> {
        let Some(payment) = self.payments.get_payment_by_intent(intent_id).await? else {
            warn!(intent_id, "Failure for unknown payment intent");
            return Ok(());
        };
        if payment.processor_intent_id != intent_id {
            debug!(intent_id, payment_id = %payment.id, "Failure of a superseded intent ignored");
            return Ok(());
        }
        let change = PaymentChange::failed(payment.id, reason, self.clock.now());
        match self.payments.transition_payment(change).await? {
            Some(failed) => {
                info!(payment_id = %failed.id, reason = ?failed.failure_reason, "Payment failed");
            }
            None => {
                debug!(payment_id = %payment.id, status = %payment.status, "Late failure ignored");
            }
        }
        Ok(())
    }

    async fn account_updated(&self, account_id: &str, payable: bool) -> Result<(), BillingError> {
        let updated = if payable {
            self.verification.approve_from_processor(account_id).await?
        } else {
            self.verification.disable_payouts(account_id).await?
        };
        if updated.is_none() {
            warn!(account_id, "Update for unknown connected account");
        }
        Ok(())
    }

    async fn send(&self, notification: Notification) {
        let kind = notification.kind();
        if let Err(err) = self.notifier.notify(notification).await {
            warn!(kind, error = %err, "Notification delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commission::CommissionCalculator;
    use crate::ports::mock::{MockInvoicePort, MockPaymentPort, MockWebhookLedger};
    use crate::ports::InvoicePort;
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
    use core_kernel::notify::mock::RecordingNotifier;
    use core_kernel::{Currency, ManualClock, Money, PaymentId, UserId};
    use domain_booking::ports::mock::MockBookingPort;
    use domain_booking::{BookingPort, StatusChange};
    use domain_pricing::ports::mock::MockTariffPort;
    use domain_pricing::{AddonFlags, Tariff, TariffFields};
    use domain_verification::ports::mock::MockVerificationPort;
    use domain_verification::{HostVerification, VerificationPort, VerificationStatus};
    use rust_decimal_macros::dec;
    use serde_json::json;

    const SECRET: &str = "whsec_test";

    struct Fixture {
        reconciler: WebhookReconciler,
        bookings: MockBookingPort,
        payments: MockPaymentPort,
        invoices: MockInvoicePort,
        ledger: MockWebhookLedger,
        verifications: MockVerificationPort,
        notifier: RecordingNotifier,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap());
        let bookings = MockBookingPort::new();
        let payments = MockPaymentPort::new();
        let invoices = MockInvoicePort::new();
        let ledger = MockWebhookLedger::new();
        let verifications = MockVerificationPort::new();
        let notifier = RecordingNotifier::new();

        let booking_service = BookingService::new(
            Arc::new(bookings.clone()),
            Arc::new(MockTariffPort::new()),
            Arc::new(verifications.clone()),
            Arc::new(notifier.clone()),
            Arc::new(clock.clone()),
        );
        let verification_service = VerificationService::new(
            Arc::new(verifications.clone()),
            Arc::new(notifier.clone()),
            Arc::new(clock.clone()),
        );
        let reconciler = WebhookReconciler::new(
            SignatureVerifier::new(SECRET),
            Arc::new(ledger.clone()),
            Arc::new(payments.clone()),
            booking_service,
            InvoiceSequencer::new(Arc::new(invoices.clone())),
            verification_service,
            Arc::new(notifier.clone()),
            Arc::new(clock.clone()),
        );
        Fixture {
            reconciler,
            bookings,
            payments,
            invoices,
            ledger,
            verifications,
            notifier,
            clock,
        }
    }

    /// A pending booking with a pending payment on intent `pi_1`
    async fn paid_booking(f: &Fixture) -> (Booking, Payment) {
        let now = f.clock.now();
        let tariff = Tariff::new(
            UserId::new(),
            60,
            TariffFields::active(Money::new(dec!(100.00), Currency::EUR), AddonFlags::none()),
            now,
        );
        let booking = Booking::from_tariff(
            &tariff,
            UserId::new(),
            NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            vec![],
            None,
            now,
        );
        let booking = f.bookings.insert_booking(booking).await.unwrap();
        let settlement = CommissionCalculator::default().split(&booking.price).unwrap();
        let payment = Payment::pending(PaymentId::new(), booking.id, "pi_1", &settlement, None, now);
        let payment = f.payments.insert_payment(payment).await.unwrap();
        (booking, payment)
    }

    fn delivery(f: &Fixture, event: serde_json::Value) -> (String, Vec<u8>) {
        let body = event.to_string().into_bytes();
        let header = SignatureVerifier::new(SECRET).sign(&body, f.clock.now().timestamp());
        (header, body)
    }

    fn succeeded(event_id: &str, intent_id: &str) -> serde_json::Value {
        json!({"id": event_id, "type": "payment_intent.succeeded", "data": {"object": {"id": intent_id}}})
    }

    #[tokio::test]
    async fn test_success_confirms_and_issues_one_invoice() {
        let f = fixture();
        let (booking, payment) = paid_booking(&f).await;
        let (header, body) = delivery(&f, succeeded("evt_1", "pi_1"));

        let outcome = f.reconciler.handle(&header, &body).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Processed { .. }));

        let booking = f.bookings.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        let payment = f.payments.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Succeeded);

        let invoice = f.invoices.get_invoice_for_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(invoice.invoice_number.to_string(), "INV-2025-000001");
        assert_eq!(invoice.user_id, booking.guest_id);
        assert_eq!(f.notifier.count_kind("booking_confirmed"), 2);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_has_no_side_effects() {
        let f = fixture();
        let (booking, _) = paid_booking(&f).await;
        let (header, body) = delivery(&f, succeeded("evt_1", "pi_1"));

        f.reconciler.handle(&header, &body).await.unwrap();
        let second = f.reconciler.handle(&header, &body).await.unwrap();

        assert_eq!(second, ReconcileOutcome::Duplicate { event_id: "evt_1".into() });
        let invoices = f.invoices.list_invoices_for_user(booking.guest_id).await.unwrap();
        assert_eq!(invoices.len(), 1);
        assert_eq!(f.notifier.count_kind("booking_confirmed"), 2);
    }

    #[tokio::test]
    async fn test_distinct_events_for_same_intent_issue_one_invoice() {
        let f = fixture();
        let (booking, _) = paid_booking(&f).await;
        for event_id in ["evt_1", "evt_2"] {
            let (header, body) = delivery(&f, succeeded(event_id, "pi_1"));
            f.reconciler.handle(&header, &body).await.unwrap();
        }
        assert_eq!(f.invoices.list_invoices_for_user(booking.host_id).await.unwrap().len(), 1);
        assert_eq!(f.notifier.count_kind("booking_confirmed"), 2);
    }

    #[tokio::test]
    async fn test_unfinished_event_is_replayed() {
        let f = fixture();
        let (booking, _) = paid_booking(&f).await;
        // A previous delivery claimed the event and died before finishing
        f.ledger.claim_event("evt_1", "payment_intent.succeeded").await.unwrap();

        let (header, body) = delivery(&f, succeeded("evt_1", "pi_1"));
        let outcome = f.reconciler.handle(&header, &body).await.unwrap();

        assert!(matches!(outcome, ReconcileOutcome::Processed { .. }));
        assert_eq!(f.ledger.attempts("evt_1").await, 2);
        let booking = f.bookings.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_bad_signature_changes_nothing() {
        let f = fixture();
        let (booking, payment) = paid_booking(&f).await;
        let body = succeeded("evt_1", "pi_1").to_string().into_bytes();
        let header = SignatureVerifier::new("wrong").sign(&body, f.clock.now().timestamp());

        let err = f.reconciler.handle(&header, &body).await.unwrap_err();
        assert!(matches!(err, BillingError::Signature(_)));
        assert_eq!(f.ledger.attempts("evt_1").await, 0);
        let payment = f.payments.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
        let booking = f.bookings.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_failure_keeps_booking_pending_and_late_failure_is_noop() {
        let f = fixture();
        let (booking, payment) = paid_booking(&f).await;
        let failed = json!({
            "id": "evt_f",
            "type": "payment_intent.payment_failed",
            "data": {"object": {"id": "pi_1", "last_payment_error": {"message": "declined"}}}
        });
        let (header, body) = delivery(&f, failed);
        f.reconciler.handle(&header, &body).await.unwrap();

        let stored = f.payments.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);
        assert_eq!(stored.failure_reason.as_deref(), Some("declined"));
        let pending = f.bookings.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(pending.status, BookingStatus::Pending);

        // Success after failure still wins
        let (header, body) = delivery(&f, succeeded("evt_s", "pi_1"));
        f.reconciler.handle(&header, &body).await.unwrap();
        let late = json!({"id": "evt_f2", "type": "payment_intent.payment_failed", "data": {"object": {"id": "pi_1"}}});
        let (header, body) = delivery(&f, late);
        f.reconciler.handle(&header, &body).await.unwrap();

        let stored = f.payments.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Succeeded);
    }

    /// Fails `pi_1` and re-arms the payment onto `pi_2`
    async fn rearmed_payment(f: &Fixture) -> (Booking, Payment) {
        let (booking, payment) = paid_booking(f).await;
        f.payments
            .transition_payment(PaymentChange::failed(payment.id, Some("declined".into()), f.clock.now()))
            .await
            .unwrap();
        let rearmed = f
            .payments
            .rearm_payment(crate::ports::RearmPayment {
                payment_id: payment.id,
                previous_intent_id: "pi_1".into(),
                intent_id: "pi_2".into(),
                settlement: payment.settlement(),
                fee_split: None,
                at: f.clock.now(),
            })
            .await
            .unwrap()
            .unwrap();
        (booking, rearmed)
    }

    #[tokio::test]
    async fn test_late_success_on_superseded_intent_settles_payment() {
        let f = fixture();
        let (booking, payment) = rearmed_payment(&f).await;

        let (header, body) = delivery(&f, succeeded("evt_late", "pi_1"));
        let outcome = f.reconciler.handle(&header, &body).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Processed { .. }));

        let stored = f.payments.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Succeeded);
        let confirmed = f.bookings.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert!(f.invoices.get_invoice_for_payment(payment.id).await.unwrap().is_some());
        assert_eq!(f.notifier.count_kind("booking_confirmed"), 2);
    }

    #[tokio::test]
    async fn test_failure_of_superseded_intent_leaves_retry_pending() {
        let f = fixture();
        let (_, payment) = rearmed_payment(&f).await;
        let stale = json!({"id": "evt_old", "type": "payment_intent.payment_failed", "data": {"object": {"id": "pi_1"}}});
        let (header, body) = delivery(&f, stale);
        f.reconciler.handle(&header, &body).await.unwrap();

        let stored = f.payments.get_payment(payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert_eq!(stored.processor_intent_id, "pi_2");
    }

    #[tokio::test]
    async fn test_success_for_cancelled_booking_records_money_only() {
        let f = fixture();
        let (booking, payment) = paid_booking(&f).await;
        f.bookings
            .transition_status(StatusChange::to(booking.id, BookingStatus::Cancelled, f.clock.now()))
            .await
            .unwrap();

        let (header, body) = delivery(&f, succeeded("evt_1", "pi_1"));
        f.reconciler.handle(&header, &body).await.unwrap();

        let booking = f.bookings.get_booking(booking.id).await.unwrap().unwrap();
        assert_eq!(booking.status, BookingStatus::Cancelled);
        assert!(f.invoices.get_invoice_for_payment(payment.id).await.unwrap().is_some());
        assert_eq!(f.notifier.count_kind("booking_confirmed"), 0);
    }

    #[tokio::test]
    async fn test_unknown_intent_and_event_type_acknowledged() {
        let f = fixture();
        let (header, body) = delivery(&f, succeeded("evt_1", "pi_missing"));
        assert!(f.reconciler.handle(&header, &body).await.is_ok());

        let other = json!({"id": "evt_2", "type": "charge.refunded", "data": {"object": {"id": "ch_1"}}});
        let (header, body) = delivery(&f, other);
        let outcome = f.reconciler.handle(&header, &body).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Ignored { .. }));
    }

    #[tokio::test]
    async fn test_account_updates_drive_verification() {
        let f = fixture();
        let host = UserId::new();
        let mut record = HostVerification::unregistered(host, f.clock.now());
        record.status = VerificationStatus::PendingReview;
        record.connected_account_id = Some("acct_1".into());
        f.verifications.insert(record).await;

        let payable = json!({
            "id": "evt_a1",
            "type": "account.updated",
            "data": {"object": {"id": "acct_1", "payouts_enabled": true, "charges_enabled": true}}
        });
        let (header, body) = delivery(&f, payable);
        f.reconciler.handle(&header, &body).await.unwrap();

        let stored = f.verifications.get_verification(host).await.unwrap().unwrap();
        assert_eq!(stored.status, VerificationStatus::Approved);
        assert!(stored.payouts_enabled);

        let disabled = json!({
            "id": "evt_a2",
            "type": "account.updated",
            "data": {"object": {"id": "acct_1", "payouts_enabled": false, "charges_enabled": true}}
        });
        let (header, body) = delivery(&f, disabled);
        f.reconciler.handle(&header, &body).await.unwrap();

        let stored = f.verifications.get_verification(host).await.unwrap().unwrap();
        assert_eq!(stored.status, VerificationStatus::Approved);
        assert!(!stored.payouts_enabled);
    }
}
