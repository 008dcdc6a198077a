//! Tests for the storage-free parts of billing

use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;

use core_kernel::{Currency, Money, Rate};
use domain_billing::{
    AddonPricing, BillingError, CommissionCalculator, EventKind, InvoiceNumber, SignatureError, SignatureVerifier,
    WebhookEvent,
};
use domain_pricing::Addon;

mod commission_tests {
    use super::*;

    #[test]
    fn test_configured_rates() {
        let calc = CommissionCalculator::new(Rate::from_percentage(dec!(15)), Rate::from_percentage(dec!(20))).unwrap();
        let s = calc.split(&Money::new(dec!(80.00), Currency::EUR)).unwrap();
        assert_eq!(s.commission.amount(), dec!(12.00));
        assert_eq!(s.vat.amount(), dec!(2.40));
        assert_eq!(s.host_amount.amount(), dec!(65.60));
    }

    #[test]
    fn test_sub_cent_gross_is_rounded_first() {
        let s = CommissionCalculator::default()
            .split(&Money::new(dec!(99.995), Currency::EUR))
            .unwrap();
        assert_eq!(s.gross.amount(), dec!(100.00));
        assert_eq!(s.host_amount.amount(), dec!(87.90));
    }

    #[test]
    fn test_full_commission_leaves_host_nothing() {
        let calc = CommissionCalculator::new(Rate::new(dec!(1)), Rate::new(dec!(0))).unwrap();
        let s = calc.split(&Money::new(dec!(40.00), Currency::EUR)).unwrap();
        assert_eq!(s.commission.amount(), dec!(40.00));
        assert!(s.host_amount.is_zero());
    }
}

mod invoice_number_tests {
    use super::*;

    #[test]
    fn test_display_and_parse_agree() {
        let n: InvoiceNumber = "CM-2031-004200".parse().unwrap();
        assert_eq!(n.to_string(), "CM-2031-004200");
        assert_eq!(n.seq(), 4200);
    }

    #[test]
    fn test_sequence_beyond_padding_still_formats() {
        let n = InvoiceNumber::new("INV", 2025, 1_234_567).unwrap();
        assert_eq!(n.to_string(), "INV-2025-1234567");
    }

    #[test]
    fn test_invalid_prefixes_rejected() {
        assert!(InvoiceNumber::new("", 2025, 1).is_err());
        assert!(InvoiceNumber::new("IN V", 2025, 1).is_err());
        assert!(matches!(InvoiceNumber::new("INV", 0, 1), Err(BillingError::Validation(_))));
    }
}

mod webhook_tests {
    use super::*;

    #[test]
    fn test_custom_tolerance() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let verifier = SignatureVerifier::new("whsec").with_tolerance(10);
        let header = verifier.sign(b"{}", now.timestamp() - 11);
        assert_eq!(verifier.verify(&header, b"{}", now), Err(SignatureError::Expired));
    }

    #[test]
    fn test_future_timestamps_also_bounded() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let verifier = SignatureVerifier::new("whsec");
        let header = verifier.sign(b"{}", now.timestamp() + 3600);
        assert_eq!(verifier.verify(&header, b"{}", now), Err(SignatureError::Expired));
    }

    #[test]
    fn test_succeeded_event_parsed() {
        let body = br#"{"id":"evt_9","type":"payment_intent.succeeded","data":{"object":{"id":"pi_3","amount":5000}}}"#;
        let event = WebhookEvent::parse(body).unwrap();
        assert_eq!(event.id, "evt_9");
        assert_eq!(event.kind, EventKind::IntentSucceeded { intent_id: "pi_3".into() });
    }

    #[test]
    fn test_account_flags_default_to_false() {
        let body = br#"{"id":"evt_a","type":"account.updated","data":{"object":{"id":"acct_7"}}}"#;
        let event = WebhookEvent::parse(body).unwrap();
        assert_eq!(
            event.kind,
            EventKind::AccountUpdated {
                account_id: "acct_7".into(),
                payouts_enabled: false,
                charges_enabled: false
            }
        );
    }
}

mod addon_pricing_tests {
    use super::*;

    #[test]
    fn test_every_addon_has_a_price() {
        let pricing = AddonPricing::default();
        for addon in Addon::ALL {
            assert!(pricing.price_of(addon, Currency::EUR).is_positive(), "{:?}", addon);
        }
    }

    #[test]
    fn test_configured_prices_deserialize_camel_case() {
        let pricing: AddonPricing = serde_json::from_value(serde_json::json!({
            "screenSharing": "2.50",
            "translation": "30",
            "recording": "0",
            "transcription": "12"
        }))
        .unwrap();
        assert_eq!(pricing.price_of(Addon::ScreenSharing, Currency::EUR).amount(), dec!(2.50));
        assert!(pricing.price_of(Addon::Recording, Currency::EUR).is_zero());
    }
}
