//! End-to-end scenarios over the in-memory marketplace

use chrono::Duration;
use rust_decimal_macros::dec;

use core_kernel::{Currency, Money, UserId};
use domain_billing::{BillingError, CommissionCalculator, IntentStatus, PaymentProcessor, PaymentStatus, ReconcileOutcome};
use domain_booking::{BookingError, BookingStatus};
use domain_pricing::{Addon, PricingError};
use domain_verification::{VerificationError, VerificationStatus};
use test_utils::*;

mod pricing {
    use super::*;

    #[tokio::test]
    async fn test_sixth_active_tariff_is_refused_and_existing_ones_survive() {
        let market = Marketplace::new();
        let host = UserId::new();
        for minutes in [30, 60, 90, 120, 150] {
            market.tariff(host, minutes).await;
        }

        let sixth = market
            .tariffs
            .upsert(host, 180, TariffFieldsBuilder::new().build())
            .await;
        assert!(matches!(sixth, Err(PricingError::TariffLimitExceeded { limit: 5, .. })));

        let tariffs = market.tariffs.list(host).await.unwrap();
        let durations: Vec<u32> = tariffs.iter().map(|t| t.duration_minutes).collect();
        assert_eq!(durations, vec![30, 60, 90, 120, 150]);
    }

    #[tokio::test]
    async fn test_inactive_tariffs_do_not_count_towards_the_cap() {
        let market = Marketplace::new();
        let host = UserId::new();
        for minutes in [30, 45, 60, 90, 120] {
            market.tariff(host, minutes).await;
        }
        market
            .tariffs
            .upsert(host, 120, TariffFieldsBuilder::new().inactive().build())
            .await
            .unwrap();

        let replacement = market.tariff(host, 150).await;
        assert!(replacement.is_active);
    }

    #[tokio::test]
    async fn test_updating_an_existing_duration_keeps_one_row() {
        let market = Marketplace::new();
        let host = UserId::new();
        let first = market.tariff(host, 60).await;
        let updated = market
            .tariffs
            .upsert(
                host,
                60,
                TariffFieldsBuilder::new().with_price(MoneyFixtures::eur_80()).build(),
            )
            .await
            .unwrap();

        assert_eq!(updated.id, first.id);
        assert_money_eq(&updated.price, dec!(80));
        assert_eq!(market.tariffs.list(host).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_switching_primary_leaves_exactly_one() {
        let market = Marketplace::new();
        let host = UserId::new();
        let sixty = market.tariff(host, 60).await;
        let ninety = market.tariff(host, 90).await;

        market.tariffs.set_primary(sixty.id, host).await.unwrap();
        market.tariffs.set_primary(ninety.id, host).await.unwrap();

        let primaries: Vec<_> = market
            .tariffs
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
    async fn test_tariff_with_open_booking_cannot_be_deleted() {
        let market = Marketplace::new();
        let booking = market.pending_booking().await;

        let refused = market.tariffs.delete(booking.tariff_id, booking.host_id).await;
        assert!(matches!(refused, Err(PricingError::TariffInUse(_))));

        market.bookings.cancel(booking.id, booking.guest_id).await.unwrap();
        market.tariffs.delete(booking.tariff_id, booking.host_id).await.unwrap();
        assert!(market.tariffs.list(booking.host_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tariff_of_completed_booking_cannot_be_deleted() {
        let market = Marketplace::new();
        let booking = market.pending_booking().await;
        market.bookings.confirm(booking.id).await.unwrap();
        market.bookings.complete(booking.id).await.unwrap();

        let refused = market.tariffs.delete(booking.tariff_id, booking.host_id).await;
        assert!(matches!(refused, Err(PricingError::TariffInUse(_))));
        assert!(market.tariffs.get(booking.tariff_id).await.is_ok());
    }
}

mod commission {
    use super::*;

    #[test]
    fn test_reference_settlement() {
        let calculator = CommissionCalculator::new(RateFixtures::commission(), RateFixtures::vat()).unwrap();
        let settlement = calculator.split(&MoneyFixtures::eur_100()).unwrap();

        assert_money_eq(&settlement.commission, dec!(10.00));
        assert_money_eq(&settlement.vat, dec!(2.10));
        assert_money_eq(&settlement.host_amount, dec!(87.90));
        assert_settlement_balances(&settlement);
    }

    #[test]
    fn test_zero_decimal_currency_settles_in_whole_units() {
        let calculator = CommissionCalculator::default();
        let settlement = calculator.split(&MoneyFixtures::jpy_10000()).unwrap();

        assert_money_eq(&settlement.commission, dec!(1000));
        assert_money_eq(&settlement.vat, dec!(210));
        assert_money_eq(&settlement.host_amount, dec!(8790));
    }

    #[test]
    fn test_negative_gross_is_refused() {
        let calculator = CommissionCalculator::default();
        let negative = Money::new(dec!(-1.00), Currency::EUR);
        assert!(matches!(calculator.split(&negative), Err(BillingError::Validation(_))));
    }
}

mod booking {
    use super::*;

    #[tokio::test]
    async fn test_second_guest_for_the_same_slot_is_refused() {
        let market = Marketplace::new();
        let host = market.approved_host().await;
        let tariff = market.tariff(host.user_id, 60).await;
        let june_first = chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        market
            .bookings
            .create(CreateBookingBuilder::new(host.user_id, tariff.id).on(june_first).build())
            .await
            .unwrap();
        let second = market
            .bookings
            .create(CreateBookingBuilder::new(host.user_id, tariff.id).on(june_first).build())
            .await;
        assert!(matches!(second, Err(BookingError::SlotTaken)));
    }

    #[tokio::test]
    async fn test_cancelled_slot_can_be_booked_again() {
        let market = Marketplace::new();
        let booking = market.pending_booking().await;
        market.bookings.cancel(booking.id, booking.host_id).await.unwrap();

        let rebooked = market
            .bookings
            .create(CreateBookingBuilder::new(booking.host_id, booking.tariff_id).build())
            .await
            .unwrap();
        assert_booking_status(&rebooked, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn test_different_start_time_is_a_different_slot() {
        let market = Marketplace::new();
        let booking = market.pending_booking().await;

        let later = market
            .bookings
            .create(
                CreateBookingBuilder::new(booking.host_id, booking.tariff_id)
                    .at(TemporalFixtures::afternoon())
                    .build(),
            )
            .await;
        assert!(later.is_ok());
    }

    #[tokio::test]
    async fn test_unapproved_host_is_not_bookable() {
        let market = Marketplace::new();
        let host = UserId::new();
        market.verification.request(host).await.unwrap();
        let tariff = market.tariff(host, 60).await;

        let result = market
            .bookings
            .create(CreateBookingBuilder::new(host, tariff.id).build())
            .await;
        assert!(matches!(result, Err(BookingError::HostNotBookable(_))));
    }

    #[tokio::test]
    async fn test_add_on_must_be_offered_by_the_tariff() {
        let market = Marketplace::new();
        let host = market.approved_host().await;
        let tariff = market.tariff(host.user_id, 60).await;

        let result = market
            .bookings
            .create(
                CreateBookingBuilder::new(host.user_id, tariff.id)
                    .with_service(Addon::Translation)
                    .build(),
            )
            .await;
        assert!(matches!(result, Err(BookingError::Validation(_))));
    }

    #[tokio::test]
    async fn test_cancelling_twice_notifies_once() {
        let market = Marketplace::new();
        let booking = market.pending_booking().await;
        market.notifier.clear();

        let first = market.bookings.cancel(booking.id, booking.guest_id).await.unwrap();
        let second = market.bookings.cancel(booking.id, booking.guest_id).await.unwrap();

        assert_booking_status(&first, BookingStatus::Cancelled);
        assert_booking_status(&second, BookingStatus::Cancelled);
        assert_eq!(market.notifier.count_kind("booking_cancelled"), 1);
    }

    #[tokio::test]
    async fn test_strangers_cannot_cancel() {
        let market = Marketplace::new();
        let booking = market.pending_booking().await;
        let result = market.bookings.cancel(booking.id, UserId::new()).await;
        assert!(matches!(result, Err(BookingError::Forbidden(_))));
    }
}

mod verification {
    use super::*;

    async fn submitted_host(market: &Marketplace) -> (UserId, String) {
        let host = UserId::new();
        market.verification.request(host).await.unwrap();
        market
            .verification
            .submit_documents(host, DocumentsBuilder::new().identity().qualification().build())
            .await
            .unwrap();
        let token = market.activation_token(host).unwrap();
        (host, token)
    }

    #[tokio::test]
    async fn test_token_is_valid_just_inside_its_lifetime() {
        let market = Marketplace::new();
        let (host, token) = submitted_host(&market).await;

        market.clock.advance(Duration::hours(23));
        let activated = market.verification.activate(host, &token).await.unwrap();
        assert_eq!(activated.status, VerificationStatus::PendingReview);
        assert!(activated.activation_token.is_none());
    }

    #[tokio::test]
    async fn test_token_expires_after_a_day() {
        let market = Marketplace::new();
        let (host, token) = submitted_host(&market).await;

        market.clock.advance(Duration::hours(25));
        let result = market.verification.activate(host, &token).await;
        assert!(matches!(result, Err(VerificationError::TokenExpired)));

        let record = market.verification.status(host).await.unwrap();
        assert_eq!(record.status, VerificationStatus::DocumentsSubmitted);
    }

    #[tokio::test]
    async fn test_resend_replaces_the_token() {
        let market = Marketplace::new();
        let (host, first) = submitted_host(&market).await;

        market.clock.advance(Duration::hours(25));
        let resent = market.verification.request(host).await.unwrap();
        assert_eq!(resent.status, VerificationStatus::DocumentsSubmitted);
        let second = market.activation_token(host).unwrap();
        assert_ne!(first, second);

        assert!(matches!(
            market.verification.activate(host, &first).await,
            Err(VerificationError::InvalidToken)
        ));
        market.verification.activate(host, &second).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_host_resubmits_straight_to_review() {
        let market = Marketplace::new();
        let (host, token) = submitted_host(&market).await;
        market.verification.activate(host, &token).await.unwrap();

        let rejected = market
            .verification
            .reject(host, IdFixtures::admin(), "document unreadable")
            .await
            .unwrap();
        assert_eq!(rejected.rejection_reason.as_deref(), Some("document unreadable"));

        let resubmitted = market
            .verification
            .submit_documents(host, DocumentsBuilder::new().identity().build())
            .await
            .unwrap();
        assert_eq!(resubmitted.status, VerificationStatus::PendingReview);
        assert!(resubmitted.rejection_reason.is_none());
    }

    #[tokio::test]
    async fn test_approval_stamps_every_document() {
        let market = Marketplace::new();
        let host = market.approved_host().await;
        let documents = market.verification.documents(host.user_id).await.unwrap();
        assert!(!documents.is_empty());
        assert!(documents
            .iter()
            .all(|d| d.decision == domain_verification::DocumentDecision::Approved));
        assert!(market.verification.is_bookable(host.user_id).await.unwrap());
    }
}

mod payments {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_success_event_issues_one_invoice() {
        let market = Marketplace::new();
        let booking = market.pending_booking().await;
        let intent = market.payments.create_intent(booking.id, booking.guest_id).await.unwrap();
        let event = Events::succeeded("evt_1", &intent.intent_id);

        let first = market.deliver(&event).await.unwrap();
        assert!(matches!(first, ReconcileOutcome::Processed { .. }));
        let second = market.deliver(&event).await.unwrap();
        assert_eq!(second, ReconcileOutcome::Duplicate { event_id: "evt_1".into() });

        let confirmed = market.bookings.find(booking.id).await.unwrap();
        assert_booking_status(&confirmed, BookingStatus::Confirmed);

        let invoices = market.invoices.list_for_user(booking.guest_id).await.unwrap();
        assert_eq!(invoices.len(), 1);
        let invoice = &invoices[0];
        assert_eq!(invoice.invoice_number.to_string(), "INV-2025-000001");
        assert_money_eq(&invoice.amount, dec!(100));
        assert_money_eq(&invoice.commission, dec!(10.00));
        assert_money_eq(&invoice.vat, dec!(2.10));
        assert_money_eq(&invoice.host_amount, dec!(87.90));
        assert_eq!(market.notifier.count_kind("booking_confirmed"), 2);
    }

    #[tokio::test]
    async fn test_repeated_intent_request_reuses_the_intent() {
        let market = Marketplace::new();
        let booking = market.pending_booking().await;

        let first = market.payments.create_intent(booking.id, booking.guest_id).await.unwrap();
        let second = market.payments.create_intent(booking.id, booking.guest_id).await.unwrap();

        assert_eq!(first.intent_id, second.intent_id);
        assert_eq!(market.processor.intent_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_payment_leaves_booking_pending() {
        let market = Marketplace::new();
        let booking = market.pending_booking().await;
        let intent = market.payments.create_intent(booking.id, booking.guest_id).await.unwrap();

        market
            .deliver(&Events::failed("evt_fail", &intent.intent_id, "card_declined"))
            .await
            .unwrap();

        let view = market.payments.get_status(&intent.intent_id, booking.guest_id).await.unwrap();
        assert_eq!(view.payment_status, PaymentStatus::Failed);
        assert_booking_status(&market.bookings.find(booking.id).await.unwrap(), BookingStatus::Pending);
        assert!(market.invoices.list_for_user(booking.guest_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_success_on_the_intent_before_a_retry_still_settles() {
        let market = Marketplace::new();
        let booking = market.pending_booking().await;
        let first = market.payments.create_intent(booking.id, booking.guest_id).await.unwrap();
        market
            .deliver(&Events::failed("evt_fail", &first.intent_id, "card_declined"))
            .await
            .unwrap();
        let retry = market.payments.create_intent(booking.id, booking.guest_id).await.unwrap();
        assert_ne!(retry.intent_id, first.intent_id);

        let outcome = market.deliver(&Events::succeeded("evt_late", &first.intent_id)).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Processed { .. }));

        assert_booking_status(&market.bookings.find(booking.id).await.unwrap(), BookingStatus::Confirmed);
        let view = market.payments.get_status(&retry.intent_id, booking.guest_id).await.unwrap();
        assert_eq!(view.payment_status, PaymentStatus::Succeeded);
        assert_eq!(market.invoices.list_for_user(booking.guest_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_cancels_the_failed_intent() {
        let market = Marketplace::new();
        let booking = market.pending_booking().await;
        let first = market.payments.create_intent(booking.id, booking.guest_id).await.unwrap();
        market
            .deliver(&Events::failed("evt_fail", &first.intent_id, "card_declined"))
            .await
            .unwrap();
        market.payments.create_intent(booking.id, booking.guest_id).await.unwrap();

        let old = market.processor.retrieve_intent(&first.intent_id).await.unwrap();
        assert_eq!(old.status, IntentStatus::Canceled);
    }

    #[tokio::test]
    async fn test_stale_signature_is_refused_and_not_recorded() {
        let market = Marketplace::new();
        let booking = market.pending_booking().await;
        let intent = market.payments.create_intent(booking.id, booking.guest_id).await.unwrap();
        let event = Events::succeeded("evt_late", &intent.intent_id);
        let body = serde_json::to_vec(&event).unwrap();

        let signed_long_ago = domain_billing::SignatureVerifier::new(HARNESS_WEBHOOK_SECRET)
            .sign(&body, TemporalFixtures::start().timestamp() - 3600);
        let result = market.reconciler.handle(&signed_long_ago, &body).await;
        assert!(matches!(result, Err(BillingError::Signature(_))));

        let retried = market.deliver(&event).await.unwrap();
        assert!(matches!(retried, ReconcileOutcome::Processed { .. }));
    }

    #[tokio::test]
    async fn test_unknown_event_types_are_acknowledged() {
        let market = Marketplace::new();
        let event = serde_json::json!({
            "id": "evt_other",
            "type": "charge.refunded",
            "data": { "object": { "id": "ch_1" } }
        });
        let outcome = market.deliver(&event).await.unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Ignored { .. }));
    }

    #[tokio::test]
    async fn test_payable_account_approves_the_host() {
        let market = Marketplace::new();
        let host = UserId::new();
        market.verification.request(host).await.unwrap();
        market
            .verification
            .link_payout_account(host, StringFixtures::connected_account())
            .await
            .unwrap();

        market
            .deliver(&Events::account_updated("evt_acct", StringFixtures::connected_account(), true, true))
            .await
            .unwrap();

        let record = market.verification.status(host).await.unwrap();
        assert_eq!(record.status, VerificationStatus::Approved);
        assert!(record.payouts_enabled);
    }

    #[tokio::test]
    async fn test_disabled_payouts_keep_the_approval() {
        let market = Marketplace::new();
        let host = market.approved_host().await;
        let account = StringFixtures::connected_account();
        market.verification.link_payout_account(host.user_id, account).await.unwrap();
        market
            .deliver(&Events::account_updated("evt_on", account, true, true))
            .await
            .unwrap();
        market
            .deliver(&Events::account_updated("evt_off", account, false, true))
            .await
            .unwrap();

        let record = market.verification.status(host.user_id).await.unwrap();
        assert_eq!(record.status, VerificationStatus::Approved);
        assert!(!record.payouts_enabled);
    }
}

mod invoices {
    use super::*;

    #[tokio::test]
    async fn test_concurrent_allocation_is_gap_free() {
        let market = Marketplace::new();
        let mut handles = Vec::new();
        for _ in 0..50 {
            let sequencer = market.invoices.clone();
            handles.push(tokio::spawn(async move { sequencer.next(2025).await }));
        }

        let mut seqs = Vec::new();
        for handle in handles {
            seqs.push(handle.await.unwrap().unwrap().seq());
        }
        seqs.sort_unstable();
        assert_eq!(seqs, (1..=50).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_counters_are_per_year() {
        let market = Marketplace::new();
        assert_eq!(market.invoices.next(2025).await.unwrap().seq(), 1);
        assert_eq!(market.invoices.next(2025).await.unwrap().seq(), 2);
        assert_eq!(market.invoices.next(2026).await.unwrap().seq(), 1);
    }

    #[tokio::test]
    async fn test_paid_bookings_get_consecutive_numbers() {
        let market = Marketplace::new();
        let host = market.approved_host().await;
        let tariff = market.tariff(host.user_id, 60).await;

        let mut invoices = Vec::new();
        for (i, time) in [TemporalFixtures::morning(), TemporalFixtures::afternoon()]
            .into_iter()
            .enumerate()
        {
            let booking = market
                .bookings
                .create(CreateBookingBuilder::new(host.user_id, tariff.id).at(time).build())
                .await
                .unwrap();
            let intent = market.payments.create_intent(booking.id, booking.guest_id).await.unwrap();
            market
                .deliver(&Events::succeeded(&format!("evt_{}", i), &intent.intent_id))
                .await
                .unwrap();
            invoices.extend(market.invoices.list_for_user(booking.guest_id).await.unwrap());
        }

        assert_eq!(invoices.len(), 2);
        assert_gap_free(&invoices);
    }

    #[tokio::test]
    async fn test_only_parties_can_download() {
        let market = Marketplace::new();
        let booking = market.pending_booking().await;
        let intent = market.payments.create_intent(booking.id, booking.guest_id).await.unwrap();
        market.deliver(&Events::succeeded("evt_dl", &intent.intent_id)).await.unwrap();
        let invoice = market.invoices.list_for_user(booking.host_id).await.unwrap().remove(0);

        let downloaded = market.invoices.record_download(invoice.id, booking.guest_id).await.unwrap();
        assert_eq!(downloaded.download_count, 1);
        assert!(matches!(
            market.invoices.record_download(invoice.id, UserId::new()).await,
            Err(BillingError::Forbidden(_))
        ));
    }
}

mod concurrency {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_primary_switches_leave_one_primary() {
        let market = Marketplace::new();
        let host = UserId::new();
        let mut ids = Vec::new();
        for minutes in [30, 45, 60, 90, 120] {
            ids.push(market.tariff(host, minutes).await.id);
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

        let primaries = market
            .tariffs
            .list(host)
            .await
            .unwrap()
            .iter()
            .filter(|t| t.is_primary)
            .count();
        assert_eq!(primaries, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_activations_stop_at_the_cap() {
        let market = Marketplace::new();
        let host = UserId::new();
        for minutes in [30, 45, 60, 90] {
            market.tariff(host, minutes).await;
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

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_guests_racing_for_a_slot_get_one_booking() {
        let market = Marketplace::new();
        let host = market.approved_host().await;
        let tariff = market.tariff(host.user_id, 60).await;

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let bookings = market.bookings.clone();
                let request = CreateBookingBuilder::new(host.user_id, tariff.id).build();
                tokio::spawn(async move { bookings.create(request).await })
            })
            .collect();
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(r, Err(BookingError::SlotTaken))));
        assert_eq!(market.bookings.list_for_user(host.user_id).await.unwrap().len(), 1);
    }
}
