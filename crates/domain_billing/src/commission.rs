//! Commission and VAT split
//!
//! A pure function from a gross amount to the platform's commission, the
//! VAT charged on that commission and what is left for the host.

use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use core_kernel::{Money, Rate};

use crate::error::BillingError;

/// A gross amount split three ways
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub gross: Money,
    pub commission: Money,
    pub vat: Money,
    pub host_amount: Money,
}

impl Settlement {
    /// What the platform keeps: commission plus the VAT on it
    pub fn platform_fee(&self) -> Result<Money, BillingError> {
        Ok(self.commission.checked_add(&self.vat)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommissionCalculator {
    commission_rate: Rate,
    vat_rate: Rate,
}

impl Default for CommissionCalculator {
    /// 10% commission, 21% VAT
    fn default() -> Self {
        Self {
            commission_rate: Rate::new(dec!(0.10)),
            vat_rate: Rate::new(dec!(0.21)),
        }
    }
}

impl CommissionCalculator {
    /// Both rates must lie in [0, 1]
    pub fn new(commission_rate: Rate, vat_rate: Rate) -> Result<Self, BillingError> {
        let commission_rate = Rate::fraction(commission_rate.as_decimal())?;
        let vat_rate = Rate::fraction(vat_rate.as_decimal())?;
        Ok(Self {
            commission_rate,
            vat_rate,
        })
    }

    pub fn commission_rate(&self) -> Rate {
        self.commission_rate
    }

    pub fn vat_rate(&self) -> Rate {
        self.vat_rate
    }

    /// Splits `gross`
    ///
    /// # Errors
    ///
    /// `BillingError::Validation` for a negative gross amount
    pub fn split(&self, gross: &Money) -> Result<Settlement, BillingError> {
        if gross.is_negative() {
            return Err(BillingError::validation(format!("gross amount {} is negative", gross)));
        }
        let gross = gross.round_to_currency();
        let commission = self.commission_rate.apply(&gross);
        let vat = self.vat_rate.apply(&commission);
        let host_amount = gross
            .checked_sub(&commission)?
            .checked_sub(&vat)?
            .round_to_currency();

        Ok(Settlement {
            gross,
            commission,
            vat,
            host_amount,
        })
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use core_kernel::Currency;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    proptest! {
        #[test]
        fn parts_sum_to_gross(
            cents in 0i64..100_000_000i64,
            commission_bp in 0i64..=10_000i64,
            vat_bp in 0i64..=10_000i64
        ) {
            let calc = CommissionCalculator::new(
                Rate::new(Decimal::new(commission_bp, 4)),
                Rate::new(Decimal::new(vat_bp, 4)),
            ).unwrap();
            let gross = Money::from_minor(cents, Currency::EUR);
            let s = calc.split(&gross).unwrap();

            let total = s.commission.amount() + s.vat.amount() + s.host_amount.amount();
            prop_assert_eq!(total, gross.amount());
        }

        #[test]
        fn parts_carry_cent_precision(cents in 0i64..10_000_000i64) {
            let s = CommissionCalculator::default().split(&Money::from_minor(cents, Currency::EUR)).unwrap();
            prop_assert!(s.commission.has_currency_precision());
            prop_assert!(s.vat.has_currency_precision());
            prop_assert!(s.host_amount.has_currency_precision());
        }
    }
}
