//! Service wiring
//!
//! Every service is built from explicit ports, so the same router runs on
//! PostgreSQL in production and on [`InMemoryStore`] in tests and demos.

use std::sync::Arc;

use core_kernel::{Clock, HealthCheckable, NotificationPort};
use domain_billing::{
    BillingError, InvoicePort, InvoiceSequencer, PaymentAdapter, PaymentPort, PaymentProcessor, SignatureVerifier,
    WebhookLedgerPort, WebhookReconciler,
};
use domain_booking::{BookingPort, BookingService};
use domain_pricing::{TariffPort, TariffStore};
use domain_verification::{VerificationPort, VerificationService};
use infra_db::{
    DatabasePool, InMemoryStore, PoolHealth, PostgresBookingAdapter, PostgresInvoiceAdapter, PostgresPaymentAdapter,
    PostgresTariffAdapter, PostgresVerificationAdapter, PostgresWebhookLedger,
};

use crate::config::ApiConfig;

/// One storage backend, seen through each port
#[derive(Clone)]
pub struct Ports {
    pub tariffs: Arc<dyn TariffPort>,
    pub bookings: Arc<dyn BookingPort>,
    pub verifications: Arc<dyn VerificationPort>,
    pub payments: Arc<dyn PaymentPort>,
    pub invoices: Arc<dyn InvoicePort>,
    pub ledger: Arc<dyn WebhookLedgerPort>,
    /// Readiness check for the backend
    pub health: Arc<dyn HealthCheckable>,
}

impl Ports {
    pub fn in_memory(store: InMemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            tariffs: store.clone(),
            bookings: store.clone(),
            verifications: store.clone(),
            payments: store.clone(),
            invoices: store.clone(),
            ledger: store.clone(),
            health: store,
        }
    }

    pub fn postgres(pool: DatabasePool) -> Self {
        Self {
            tariffs: Arc::new(PostgresTariffAdapter::new(pool.clone())),
            bookings: Arc::new(PostgresBookingAdapter::new(pool.clone())),
            verifications: Arc::new(PostgresVerificationAdapter::new(pool.clone())),
            payments: Arc::new(PostgresPaymentAdapter::new(pool.clone())),
            invoices: Arc::new(PostgresInvoiceAdapter::new(pool.clone())),
            ledger: Arc::new(PostgresWebhookLedger::new(pool.clone())),
            health: Arc::new(PoolHealth::new(pool)),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub tariffs: TariffStore,
    pub bookings: BookingService,
    pub verification: VerificationService,
    pub payments: PaymentAdapter,
    pub invoices: InvoiceSequencer,
    pub reconciler: WebhookReconciler,
    pub health: Arc<dyn HealthCheckable>,
}

impl AppState {
    /// Builds every service from `config`
    ///
    /// # Errors
    ///
    /// Fails when the configured commission or VAT rate lies outside [0, 1].
    pub fn new(
        config: ApiConfig,
        ports: Ports,
        processor: Arc<dyn PaymentProcessor>,
        notifier: Arc<dyn NotificationPort>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, BillingError> {
        let calculator = config.calculator()?;

        let tariffs = TariffStore::new(ports.tariffs.clone()).with_max_active(config.max_active_tariffs);
        let verification = VerificationService::new(ports.verifications.clone(), notifier.clone(), clock.clone())
            .with_token_ttl(config.token_ttl());
        let bookings = BookingService::new(
            ports.bookings.clone(),
            ports.tariffs.clone(),
            ports.verifications.clone(),
            notifier.clone(),
            clock.clone(),
        );
        let payments = PaymentAdapter::new(
            ports.bookings.clone(),
            ports.payments.clone(),
            ports.verifications.clone(),
            processor,
            clock.clone(),
        )
        .with_calculator(calculator)
        .with_addon_pricing(config.addon_pricing());
        let invoices = InvoiceSequencer::new(ports.invoices.clone()).with_prefix(config.invoice_prefix.clone());
        let verifier =
            SignatureVerifier::new(config.webhook_secret.clone()).with_tolerance(config.webhook_tolerance_secs);
        let reconciler = WebhookReconciler::new(
            verifier,
            ports.ledger.clone(),
            ports.payments.clone(),
            bookings.clone(),
            invoices.clone(),
            verification.clone(),
            notifier,
            clock,
        );

        Ok(Self {
            config,
            tariffs,
            bookings,
            verification,
            payments,
            invoices,
            reconciler,
            health: ports.health,
        })
    }
}
