//! Pre-built Test Fixtures
//!
//! Ready-to-use values for marketplace tests. Everything is fixed so
//! assertions can compare against literal amounts and dates.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use core_kernel::{Currency, Money, Rate, UserId};
use domain_pricing::AddonFlags;
use rust_decimal_macros::dec;
use uuid::Uuid;

/// Fixture for Money test data
pub struct MoneyFixtures;

impl MoneyFixtures {
    /// The price used by the worked settlement example
    pub fn eur_100() -> Money {
        Money::new(dec!(100.00), Currency::EUR)
    }

    pub fn eur_80() -> Money {
        Money::new(dec!(80.00), Currency::EUR)
    }

    pub fn eur_zero() -> Money {
        Money::zero(Currency::EUR)
    }

    /// For currency mismatch tests
    pub fn usd_100() -> Money {
        Money::new(dec!(100.00), Currency::USD)
    }

    /// Zero decimal places
    pub fn jpy_10000() -> Money {
        Money::new(dec!(10000), Currency::JPY)
    }
}

/// Fixture for commission and VAT rates
pub struct RateFixtures;

impl RateFixtures {
    pub fn commission() -> Rate {
        Rate::new(dec!(0.10))
    }

    pub fn vat() -> Rate {
        Rate::new(dec!(0.21))
    }
}

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// The instant every harness clock starts at (Mar 1, 2025 09:00 UTC)
    pub fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    /// A session date a few weeks after `start`
    pub fn session_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 20).unwrap()
    }

    pub fn morning() -> NaiveTime {
        NaiveTime::from_hms_opt(10, 0, 0).unwrap()
    }

    pub fn afternoon() -> NaiveTime {
        NaiveTime::from_hms_opt(15, 30, 0).unwrap()
    }
}

/// Fixture for identifiers that must stay stable across a test
pub struct IdFixtures;

impl IdFixtures {
    pub fn admin() -> UserId {
        UserId::from_uuid(Uuid::from_u128(0xad41_0000_0000_4000_8000_0000_0000_0001))
    }

    pub fn user() -> UserId {
        UserId::new()
    }
}

/// Fixture for add-on combinations
pub struct AddonFixtures;

impl AddonFixtures {
    pub fn none() -> AddonFlags {
        AddonFlags::default()
    }

    pub fn screen_sharing() -> AddonFlags {
        AddonFlags {
            screen_sharing: true,
            ..AddonFlags::default()
        }
    }

    pub fn all() -> AddonFlags {
        AddonFlags {
            screen_sharing: true,
            translation: true,
            recording: true,
            transcription: true,
        }
    }
}

/// Strings used as document storage keys and connected accounts
pub struct StringFixtures;

impl StringFixtures {
    pub fn identity_document() -> &'static str {
        "uploads/identity/passport.pdf"
    }

    pub fn qualification_document() -> &'static str {
        "uploads/qualification/diploma.pdf"
    }

    pub fn connected_account() -> &'static str {
        "acct_1TestHost"
    }
}
