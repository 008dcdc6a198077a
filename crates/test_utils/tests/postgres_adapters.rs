//! Storage invariants against a real PostgreSQL
//!
//! Needs Docker; run with `cargo test -p test_utils -- --ignored`.

use std::sync::Arc;

use chrono::Utc;
use core_kernel::notify::mock::RecordingNotifier;
use core_kernel::{ManualClock, PaymentId, UserId};
use domain_billing::{CommissionCalculator, InvoiceSequencer, Payment, PaymentChange, PaymentPort, RearmPayment};
use domain_booking::{BookingError, BookingService};
use domain_pricing::{PricingError, TariffStore};
use domain_verification::{VerificationService, VerificationStatus};
use infra_db::{
    PostgresBookingAdapter, PostgresInvoiceAdapter, PostgresPaymentAdapter, PostgresTariffAdapter,
    PostgresVerificationAdapter,
};
use test_utils::*;

/// Tariff, verification and booking services over one database
struct PgMarket {
    tariffs: TariffStore,
    verification: VerificationService,
    bookings: BookingService,
    notifier: RecordingNotifier,
    db: TestDatabase,
}

impl PgMarket {
    async fn new() -> Self {
        let db = create_isolated_test_database().await.unwrap();
        let pool = db.pool().clone();
        let notifier = RecordingNotifier::new();
        let clock = Arc::new(ManualClock::new(TemporalFixtures::start()));
        let tariff_port = Arc::new(PostgresTariffAdapter::new(pool.clone()));
        let verification_port = Arc::new(PostgresVerificationAdapter::new(pool.clone()));

        let verification = VerificationService::new(verification_port.clone(), Arc::new(notifier.clone()), clock.clone());
        let bookings = BookingService::new(
            Arc::new(PostgresBookingAdapter::new(pool)),
            tariff_port.clone(),
            verification_port,
            Arc::new(notifier.clone()),
            clock,
        );
        Self {
            tariffs: TariffStore::new(tariff_port),
            verification,
            bookings,
            notifier,
            db,
        }
    }

    async fn approved_host(&self) -> UserId {
        let host = UserId::new();
        self.verification.request(host).await.unwrap();
        self.verification
            .submit_documents(host, DocumentsBuilder::new().identity().build())
            .await
            .unwrap();
        let token = self
            .notifier
            .sent_to(host)
            .into_iter()
            .rev()
            .find_map(|n| match n {
                core_kernel::Notification::ActivationRequested { token, .. } => Some(token),
                _ => None,
            })
            .unwrap();
        self.verification.activate(host, &token).await.unwrap();
        let record = self.verification.approve(host, IdFixtures::admin()).await.unwrap();
        assert_eq!(record.status, VerificationStatus::Approved);
        host
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_tariff_cap_holds_in_postgres() {
    let db = create_isolated_test_database().await.unwrap();
    let store = TariffStore::new(Arc::new(PostgresTariffAdapter::new(db.pool().clone())));
    let host = UserId::new();

    for minutes in [30, 45, 60, 90, 120] {
        store.upsert(host, minutes, TariffFieldsBuilder::new().build()).await.unwrap();
    }
    let sixth = store.upsert(host, 150, TariffFieldsBuilder::new().build()).await;
    assert!(matches!(sixth, Err(PricingError::TariffLimitExceeded { .. })));
    assert_eq!(store.list(host).await.unwrap().len(), 5);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_primary_switch_in_postgres() {
    let db = create_isolated_test_database().await.unwrap();
    let store = TariffStore::new(Arc::new(PostgresTariffAdapter::new(db.pool().clone())));
    let host = UserId::new();
    let sixty = store.upsert(host, 60, TariffFieldsBuilder::new().build()).await.unwrap();
    let ninety = store.upsert(host, 90, TariffFieldsBuilder::new().build()).await.unwrap();

    store.set_primary(sixty.id, host).await.unwrap();
    store.set_primary(ninety.id, host).await.unwrap();

    let primaries: Vec<_> = store
        .list(host)
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.is_primary)
        .map(|t| t.id)
        .collect();
    assert_eq!(primaries, vec![ninety.id]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_concurrent_invoice_numbers_are_gap_free_in_postgres() {
    let db = create_isolated_test_database().await.unwrap();
    let sequencer = InvoiceSequencer::new(Arc::new(PostgresInvoiceAdapter::new(db.pool().clone())));

    let mut handles = Vec::new();
    for _ in 0..25 {
        let sequencer = sequencer.clone();
        handles.push(tokio::spawn(async move { sequencer.next(2025).await }));
    }
    let mut seqs = Vec::new();
    for handle in handles {
        seqs.push(handle.await.unwrap().unwrap().seq());
    }
    seqs.sort_unstable();
    assert_eq!(seqs, (1..=25).collect::<Vec<u64>>());

    db.clear_data().await.unwrap();
    assert_eq!(sequencer.next(2025).await.unwrap().seq(), 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_racing_primary_switches_in_postgres() {
    let market = PgMarket::new().await;
    let host = UserId::new();
    let mut ids = Vec::new();
    for minutes in [30, 45, 60, 90, 120] {
        ids.push(market.tariffs.upsert(host, minutes, TariffFieldsBuilder::new().build()).await.unwrap().id);
    }

    let handles: Vec<_> = ids
        .iter()
        .cycle()
        .take(20)
        .map(|id| {
            let tariffs = market.tariffs.clone();
            let id = *id;
            tokio::spawn(async move { tariffs.set_primary(id, host).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let primaries = market.tariffs.list(host).await.unwrap().iter().filter(|t| t.is_primary).count();
    assert_eq!(primaries, 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_racing_activations_stop_at_the_cap_in_postgres() {
    let market = PgMarket::new().await;
    let host = UserId::new();
    for minutes in [30, 45, 60, 90] {
        market.tariffs.upsert(host, minutes, TariffFieldsBuilder::new().build()).await.unwrap();
    }

    let handles: Vec<_> = [120, 150, 180]
        .into_iter()
        .map(|minutes| {
            let tariffs = market.tariffs.clone();
            tokio::spawn(async move { tariffs.upsert(host, minutes, TariffFieldsBuilder::new().build()).await })
        })
        .collect();
    let mut won = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => won += 1,
            Err(PricingError::TariffLimitExceeded { .. }) => {}
            Err(other) => panic!("unexpected {:?}", other),
        }
    }

    assert_eq!(won, 1);
    let active = market.tariffs.list(host).await.unwrap().iter().filter(|t| t.is_active).count();
    assert_eq!(active, 5);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_two_guests_racing_for_a_slot_in_postgres() {
    let market = PgMarket::new().await;
    let host = market.approved_host().await;
    let tariff = market.tariffs.upsert(host, 60, TariffFieldsBuilder::new().build()).await.unwrap();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let bookings = market.bookings.clone();
            let request = CreateBookingBuilder::new(host, tariff.id).build();
            tokio::spawn(async move { bookings.create(request).await })
        })
        .collect();
    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(r, Err(BookingError::SlotTaken))));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_completed_booking_pins_tariff_in_postgres() {
    let market = PgMarket::new().await;
    let host = market.approved_host().await;
    let tariff = market.tariffs.upsert(host, 60, TariffFieldsBuilder::new().build()).await.unwrap();
    let booking = market
        .bookings
        .create(CreateBookingBuilder::new(host, tariff.id).build())
        .await
        .unwrap();
    market.bookings.confirm(booking.id).await.unwrap();
    market.bookings.complete(booking.id).await.unwrap();

    let refused = market.tariffs.delete(tariff.id, host).await;
    assert!(matches!(refused, Err(PricingError::TariffInUse(_))));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_superseded_intent_resolves_to_its_payment_in_postgres() {
    let market = PgMarket::new().await;
    let host = market.approved_host().await;
    let tariff = market.tariffs.upsert(host, 60, TariffFieldsBuilder::new().build()).await.unwrap();
    let booking = market
        .bookings
        .create(CreateBookingBuilder::new(host, tariff.id).build())
        .await
        .unwrap();

    let payments = PostgresPaymentAdapter::new(market.db.pool().clone());
    let settlement = CommissionCalculator::default().split(&booking.price).unwrap();
    let payment = Payment::pending(PaymentId::new(), booking.id, "pi_first", &settlement, None, Utc::now());
    let payment = payments.insert_payment(payment).await.unwrap();
    payments
        .transition_payment(PaymentChange::failed(payment.id, None, Utc::now()))
        .await
        .unwrap();
    payments
        .rearm_payment(RearmPayment {
            payment_id: payment.id,
            previous_intent_id: "pi_first".into(),
            intent_id: "pi_second".into(),
            settlement,
            fee_split: None,
            at: Utc::now(),
        })
        .await
        .unwrap()
        .unwrap();

    let by_old = payments.get_payment_by_intent("pi_first").await.unwrap().unwrap();
    let by_new = payments.get_payment_by_intent("pi_second").await.unwrap().unwrap();
    assert_eq!(by_old.id, payment.id);
    assert_eq!(by_new.processor_intent_id, "pi_second");
    assert!(payments.get_payment_by_intent("pi_other").await.unwrap().is_none());
}
