//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data
//! that maintains domain invariants.

use chrono::{NaiveDate, NaiveTime};
use core_kernel::{Currency, Money, Rate};
use domain_pricing::{Addon, AddonFlags, MAX_DURATION_MINUTES};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Strategy for generating valid Currency values
pub fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::EUR),
        Just(Currency::USD),
        Just(Currency::GBP),
        Just(Currency::CHF),
        Just(Currency::PLN),
        Just(Currency::SEK),
        Just(Currency::JPY),
    ]
}

/// Strategy for generating valid non-negative amounts in minor units
pub fn price_minor_strategy() -> impl Strategy<Value = i64> {
    0i64..10_000_000i64
}

/// Strategy for generating tariff prices in any currency
pub fn price_strategy() -> impl Strategy<Value = Money> {
    (price_minor_strategy(), currency_strategy())
        .prop_map(|(amount, currency)| Money::from_minor(amount, currency))
}

/// Strategy for generating EUR prices
pub fn eur_price_strategy() -> impl Strategy<Value = Money> {
    price_minor_strategy().prop_map(|amount| Money::from_minor(amount, Currency::EUR))
}

/// Strategy for generating fractions in [0, 1] with four decimal places
pub fn fraction_strategy() -> impl Strategy<Value = Decimal> {
    (0u32..=10_000u32).prop_map(|n| Decimal::new(n as i64, 4))
}

/// Strategy for generating (commission, VAT) pairs whose total fee stays within the gross
pub fn fee_rates_strategy() -> impl Strategy<Value = (Rate, Rate)> {
    ((0u32..=5_000u32), fraction_strategy())
        .prop_map(|(commission, vat)| (Rate::new(Decimal::new(commission as i64, 4)), Rate::new(vat)))
}

/// Strategy for generating bookable session lengths
pub fn duration_strategy() -> impl Strategy<Value = u32> {
    1u32..=MAX_DURATION_MINUTES
}

/// Strategy for generating durations outside the bookable range
pub fn invalid_duration_strategy() -> impl Strategy<Value = u32> {
    prop_oneof![Just(0u32), (MAX_DURATION_MINUTES + 1)..=u32::MAX]
}

pub fn addon_strategy() -> impl Strategy<Value = Addon> {
    proptest::sample::select(Addon::ALL.to_vec())
}

pub fn addon_flags_strategy() -> impl Strategy<Value = AddonFlags> {
    (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
        |(screen_sharing, translation, recording, transcription)| AddonFlags {
            screen_sharing,
            translation,
            recording,
            transcription,
        },
    )
}

/// Strategy for generating session dates in 2025
pub fn session_date_strategy() -> impl Strategy<Value = NaiveDate> {
    (1u32..=365u32).prop_filter_map("day of year", |day| NaiveDate::from_yo_opt(2025, day))
}

/// Strategy for generating quarter-hour start times
pub fn start_time_strategy() -> impl Strategy<Value = NaiveTime> {
    (0u32..24u32, prop_oneof![Just(0u32), Just(15u32), Just(30u32), Just(45u32)])
        .prop_filter_map("valid time", |(h, m)| NaiveTime::from_hms_opt(h, m, 0))
}

/// Strategy for generating activation token candidates that never match a real token
pub fn bogus_token_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9]{0,16}"
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_billing::CommissionCalculator;

    proptest! {
        #[test]
        fn test_generated_prices_are_non_negative(price in price_strategy()) {
            prop_assert!(!price.is_negative());
        }

        #[test]
        fn test_generated_durations_are_bookable(minutes in duration_strategy()) {
            prop_assert!(minutes >= 1 && minutes <= MAX_DURATION_MINUTES);
        }

        #[test]
        fn test_fee_rates_are_fractions((commission, vat) in fee_rates_strategy()) {
            prop_assert!(CommissionCalculator::new(commission, vat).is_ok());
        }
    }
}
