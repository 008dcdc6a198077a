//! Tariff model
//!
//! A tariff is keyed by (host, duration). Its price is stored as [`Money`]
//! so the currency always travels with the amount.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{Money, TariffId, UserId};

use crate::error::PricingError;

/// Longest bookable session, one day
pub const MAX_DURATION_MINUTES: u32 = 1440;

/// Optional services a session can be booked with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Addon {
    ScreenSharing,
    Translation,
    Recording,
    Transcription,
}

impl Addon {
    pub const ALL: [Addon; 4] = [
        Addon::ScreenSharing,
        Addon::Translation,
        Addon::Recording,
        Addon::Transcription,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Addon::ScreenSharing => "screen_sharing",
            Addon::Translation => "translation",
            Addon::Recording => "recording",
            Addon::Transcription => "transcription",
        }
    }
}

impl fmt::Display for Addon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Addon {
    type Err = PricingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "screen_sharing" | "screenSharing" => Ok(Addon::ScreenSharing),
            "translation" => Ok(Addon::Translation),
            "recording" => Ok(Addon::Recording),
            "transcription" => Ok(Addon::Transcription),
            other => Err(PricingError::validation(format!("unknown add-on '{}'", other))),
        }
    }
}

/// Which add-on services a tariff offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonFlags {
    #[serde(default)]
    pub screen_sharing: bool,
    #[serde(default)]
    pub translation: bool,
    #[serde(default)]
    pub recording: bool,
    #[serde(default)]
    pub transcription: bool,
}

impl AddonFlags {
    /// No add-ons offered
    pub fn none() -> Self {
        Self::default()
    }

    /// Every add-on offered
    pub fn all() -> Self {
        Self {
            screen_sharing: true,
            translation: true,
            recording: true,
            transcription: true,
        }
    }

    /// Builds flags from a list of add-ons
    pub fn from_addons<'a>(addons: impl IntoIterator<Item = &'a Addon>) -> Self {
        addons.into_iter().fold(Self::none(), |flags, addon| flags.with(*addon))
    }

    /// Returns a copy with `addon` switched on
    pub fn with(mut self, addon: Addon) -> Self {
        match addon {
            Addon::ScreenSharing => self.screen_sharing = true,
            Addon::Translation => self.translation = true,
            Addon::Recording => self.recording = true,
            Addon::Transcription => self.transcription = true,
        }
        self
    }

    pub fn offers(&self, addon: Addon) -> bool {
        match addon {
            Addon::ScreenSharing => self.screen_sharing,
            Addon::Translation => self.translation,
            Addon::Recording => self.recording,
            Addon::Transcription => self.transcription,
        }
    }

    /// Returns the add-ons switched on, in declaration order
    pub fn enabled(&self) -> Vec<Addon> {
        Addon::ALL.into_iter().filter(|a| self.offers(*a)).collect()
    }
}

/// Mutable attributes of a tariff, everything except its key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TariffFields {
    pub price: Money,
    pub is_active: bool,
    pub is_custom: bool,
    pub addons: AddonFlags,
}

impl TariffFields {
    /// An active, non-custom tariff at `price`
    pub fn active(price: Money, addons: AddonFlags) -> Self {
        Self {
            price,
            is_active: true,
            is_custom: false,
            addons,
        }
    }

    /// Returns a copy marked inactive
    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Checks price constraints
    ///
    /// The price must be strictly positive and carry no more precision than
    /// the currency's minor unit.
    pub fn validate(&self) -> Result<(), PricingError> {
        if !self.price.is_positive() {
            return Err(PricingError::validation(format!(
                "price must be positive, got {}",
                self.price
            )));
        }
        if !self.price.has_currency_precision() {
            return Err(PricingError::validation(format!(
                "price {} has more than {} decimal places",
                self.price.amount(),
                self.price.currency().decimal_places()
            )));
        }
        Ok(())
    }
}

/// Checks that a duration lies in 1..=1440 minutes
pub fn validate_duration(duration_minutes: u32) -> Result<(), PricingError> {
    if duration_minutes == 0 || duration_minutes > MAX_DURATION_MINUTES {
        return Err(PricingError::validation(format!(
            "duration must be between 1 and {} minutes, got {}",
            MAX_DURATION_MINUTES, duration_minutes
        )));
    }
    Ok(())
}

/// A host's bookable (duration, price) offering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tariff {
    pub id: TariffId,
    pub host_id: UserId,
    pub duration_minutes: u32,
    pub price: Money,
    pub is_active: bool,
    pub is_primary: bool,
    pub is_custom: bool,
    pub addons: AddonFlags,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tariff {
    /// Creates a new, non-primary tariff
    pub fn new(host_id: UserId, duration_minutes: u32, fields: TariffFields, now: DateTime<Utc>) -> Self {
        Self {
            id: TariffId::new(),
            host_id,
            duration_minutes,
            price: fields.price,
            is_active: fields.is_active,
            is_primary: false,
            is_custom: fields.is_custom,
            addons: fields.addons,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites the mutable attributes
    ///
    /// Deactivation drops the primary flag; a primary tariff is always active.
    pub fn apply(&mut self, fields: TariffFields, now: DateTime<Utc>) {
        self.price = fields.price;
        self.is_active = fields.is_active;
        self.is_custom = fields.is_custom;
        self.addons = fields.addons;
        if !self.is_active {
            self.is_primary = false;
        }
        self.updated_at = now;
    }

    /// Returns true if the tariff offers every add-on in `requested`
    pub fn offers_all(&self, requested: &[Addon]) -> bool {
        requested.iter().all(|addon| self.addons.offers(*addon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;
    use rust_decimal_macros::dec;

    fn eur(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::EUR)
    }

    #[test]
    fn test_duration_bounds() {
        assert!(validate_duration(0).is_err());
        assert!(validate_duration(1).is_ok());
        assert!(validate_duration(1440).is_ok());
        assert!(validate_duration(1441).is_err());
    }

    #[test]
    fn test_price_must_be_positive_with_cent_precision() {
        assert!(TariffFields::active(eur(dec!(50.00)), AddonFlags::none()).validate().is_ok());
        assert!(TariffFields::active(eur(dec!(0)), AddonFlags::none()).validate().is_err());
        assert!(TariffFields::active(eur(dec!(-5)), AddonFlags::none()).validate().is_err());
        assert!(TariffFields::active(eur(dec!(9.999)), AddonFlags::none()).validate().is_err());
    }

    #[test]
    fn test_deactivation_clears_primary() {
        let now = Utc::now();
        let mut tariff = Tariff::new(UserId::new(), 60, TariffFields::active(eur(dec!(80)), AddonFlags::none()), now);
        tariff.is_primary = true;

        tariff.apply(TariffFields::active(eur(dec!(80)), AddonFlags::none()).deactivated(), now);

        assert!(!tariff.is_active);
        assert!(!tariff.is_primary);
    }

    #[test]
    fn test_addon_subset() {
        let now = Utc::now();
        let flags = AddonFlags::none().with(Addon::Recording).with(Addon::Translation);
        let tariff = Tariff::new(UserId::new(), 30, TariffFields::active(eur(dec!(40)), flags), now);

        assert!(tariff.offers_all(&[Addon::Recording]));
        assert!(tariff.offers_all(&[]));
        assert!(!tariff.offers_all(&[Addon::Recording, Addon::ScreenSharing]));
        assert_eq!(flags.enabled(), vec![Addon::Translation, Addon::Recording]);
    }

    #[test]
    fn test_addon_parsing() {
        assert_eq!("screen_sharing".parse::<Addon>().unwrap(), Addon::ScreenSharing);
        assert_eq!("screenSharing".parse::<Addon>().unwrap(), Addon::ScreenSharing);
        assert!("karaoke".parse::<Addon>().is_err());
    }

    #[test]
    fn test_addon_flags_serialize_camel_case() {
        let json = serde_json::to_value(AddonFlags::none().with(Addon::ScreenSharing)).unwrap();
        assert_eq!(json["screenSharing"], true);
        assert_eq!(json["transcription"], false);
    }
}
