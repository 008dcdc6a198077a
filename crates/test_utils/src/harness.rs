//! In-memory marketplace
//!
//! Wires every service the way the API server does, but over one
//! [`InMemoryStore`], a [`ManualClock`], a [`RecordingNotifier`] and a
//! [`FakeProcessor`]. Scenario tests drive the services directly and sign
//! their own webhook deliveries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use core_kernel::notify::mock::RecordingNotifier;
use core_kernel::{Clock, ManualClock, Notification, UserId};
use domain_billing::processor::mock::FakeProcessor;
use domain_billing::{
    BillingError, InvoiceSequencer, PaymentAdapter, ReconcileOutcome, SignatureVerifier, WebhookReconciler,
};
use domain_booking::{Booking, BookingService};
use domain_pricing::{Tariff, TariffStore};
use domain_verification::{HostVerification, VerificationService};
use infra_db::InMemoryStore;

use crate::builders::{CreateBookingBuilder, DocumentsBuilder, TariffFieldsBuilder};
use crate::fixtures::{IdFixtures, TemporalFixtures};

/// Secret shared by the harness reconciler and [`Marketplace::deliver`]
pub const HARNESS_WEBHOOK_SECRET: &str = "whsec_harness";

pub struct Marketplace {
    pub store: InMemoryStore,
    pub clock: ManualClock,
    pub notifier: RecordingNotifier,
    pub processor: FakeProcessor,
    pub tariffs: TariffStore,
    pub bookings: BookingService,
    pub verification: VerificationService,
    pub payments: PaymentAdapter,
    pub invoices: InvoiceSequencer,
    pub reconciler: WebhookReconciler,
    verifier: SignatureVerifier,
}

impl Default for Marketplace {
    fn default() -> Self {
        Self::new()
    }
}

impl Marketplace {
    /// A marketplace whose clock starts at [`TemporalFixtures::start`]
    pub fn new() -> Self {
        Self::starting_at(TemporalFixtures::start())
    }

    pub fn starting_at(instant: DateTime<Utc>) -> Self {
        let store = InMemoryStore::new();
        let clock = ManualClock::new(instant);
        let notifier = RecordingNotifier::new();
        let processor = FakeProcessor::new();

        let port = Arc::new(store.clone());
        let clock_port = Arc::new(clock.clone());
        let notifier_port = Arc::new(notifier.clone());

        let tariffs = TariffStore::new(port.clone());
        let verification = VerificationService::new(port.clone(), notifier_port.clone(), clock_port.clone());
        let bookings = BookingService::new(
            port.clone(),
            port.clone(),
            port.clone(),
            notifier_port.clone(),
            clock_port.clone(),
        );
        let payments = PaymentAdapter::new(
            port.clone(),
            port.clone(),
            port.clone(),
            Arc::new(processor.clone()),
            clock_port.clone(),
        );
        let invoices = InvoiceSequencer::new(port.clone());
        let verifier = SignatureVerifier::new(HARNESS_WEBHOOK_SECRET);
        let reconciler = WebhookReconciler::new(
            verifier.clone(),
            port.clone(),
            port,
            bookings.clone(),
            invoices.clone(),
            verification.clone(),
            notifier_port,
            clock_port,
        );

        Self {
            store,
            clock,
            notifier,
            processor,
            tariffs,
            bookings,
            verification,
            payments,
            invoices,
            reconciler,
            verifier,
        }
    }

    /// The activation token most recently mailed to `user_id`
    pub fn activation_token(&self, user_id: UserId) -> Option<String> {
        self.notifier
            .sent_to(user_id)
            .into_iter()
            .rev()
            .find_map(|n| match n {
                Notification::ActivationRequested { token, .. } => Some(token),
                _ => None,
            })
    }

    /// A host taken through request, documents, activation and approval
    pub async fn approved_host(&self) -> HostVerification {
        let host = UserId::new();
        self.verification.request(host).await.unwrap();
        self.verification
            .submit_documents(host, DocumentsBuilder::new().identity().build())
            .await
            .unwrap();
        let token = self.activation_token(host).unwrap();
        self.verification.activate(host, &token).await.unwrap();
        self.verification.approve(host, IdFixtures::admin()).await.unwrap()
    }

    /// An active EUR 100 tariff
    pub async fn tariff(&self, host: UserId, duration_minutes: u32) -> Tariff {
        self.tariffs
            .upsert(host, duration_minutes, TariffFieldsBuilder::new().build())
            .await
            .unwrap()
    }

    /// An approved host with a 60 minute tariff and one pending booking
    pub async fn pending_booking(&self) -> Booking {
        let host = self.approved_host().await;
        let tariff = self.tariff(host.user_id, 60).await;
        self.bookings
            .create(CreateBookingBuilder::new(host.user_id, tariff.id).build())
            .await
            .unwrap()
    }

    /// Signs `event` with the harness secret at the clock's instant and hands it to the reconciler
    pub async fn deliver(&self, event: &Value) -> Result<ReconcileOutcome, BillingError> {
        let body = serde_json::to_vec(event).unwrap();
        let header = self.verifier.sign(&body, self.clock.now().timestamp());
        self.reconciler.handle(&header, &body).await
    }
}

/// Processor event payloads
pub struct Events;

impl Events {
    pub fn succeeded(event_id: &str, intent_id: &str) -> Value {
        json!({
            "id": event_id,
            "type": "payment_intent.succeeded",
            "data": { "object": { "id": intent_id, "status": "succeeded" } }
        })
    }

    pub fn failed(event_id: &str, intent_id: &str, reason: &str) -> Value {
        json!({
            "id": event_id,
            "type": "payment_intent.payment_failed",
            "data": { "object": { "id": intent_id, "last_payment_error": { "message": reason } } }
        })
    }

    pub fn account_updated(event_id: &str, account_id: &str, payouts: bool, charges: bool) -> Value {
        json!({
            "id": event_id,
            "type": "account.updated",
            "data": { "object": { "id": account_id, "payouts_enabled": payouts, "charges_enabled": charges } }
        })
    }
}
