//! Invoices
//!
//! One invoice per successful payment, immutable apart from its download
//! counter. Numbers look like `INV-2025-000042`; the zero padding keeps
//! them in order when sorted as text.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{BookingId, InvoiceId, Money, PaymentId, UserId};

use crate::commission::Settlement;
use crate::error::BillingError;

/// `PREFIX-YEAR-SEQ`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InvoiceNumber {
    prefix: String,
    year: i32,
    seq: u64,
}

impl InvoiceNumber {
    pub fn new(prefix: impl Into<String>, year: i32, seq: u64) -> Result<Self, BillingError> {
        let prefix = prefix.into();
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(BillingError::validation(format!("invalid invoice prefix '{}'", prefix)));
        }
        if !(1..=9999).contains(&year) {
            return Err(BillingError::validation(format!("invalid invoice year {}", year)));
        }
        if seq == 0 {
            return Err(BillingError::validation("invoice sequence starts at 1"));
        }
        Ok(Self { prefix, year, seq })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:04}-{:06}", self.prefix, self.year, self.seq)
    }
}

impl FromStr for InvoiceNumber {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BillingError::validation(format!("invalid invoice number '{}'", s));
        let mut parts = s.rsplitn(3, '-');
        let seq = parts.next().ok_or_else(invalid)?;
        let year = parts.next().ok_or_else(invalid)?;
        let prefix = parts.next().ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let seq = seq.parse::<u64>().map_err(|_| invalid())?;
        InvoiceNumber::new(prefix, year, seq)
    }
}

impl TryFrom<String> for InvoiceNumber {
    type Error = BillingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InvoiceNumber> for String {
    fn from(number: InvoiceNumber) -> String {
        number.to_string()
    }
}

/// Everything about an invoice except its id and number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvoice {
    pub payment_id: PaymentId,
    pub booking_id: BookingId,
    /// The guest who paid
    pub user_id: UserId,
    pub host_id: UserId,
    pub issue_date: NaiveDate,
    pub settlement: Settlement,
}

impl NewInvoice {
    pub fn year(&self) -> i32 {
        self.issue_date.year()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: InvoiceId,
    pub invoice_number: InvoiceNumber,
    pub payment_id: PaymentId,
    pub booking_id: BookingId,
    pub user_id: UserId,
    pub host_id: UserId,
    pub issue_date: NaiveDate,
    pub amount: Money,
    pub commission: Money,
    pub vat: Money,
    pub host_amount: Money,
    pub download_count: u32,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    /// Materializes `new` under an allocated number
    pub fn issue(new: NewInvoice, invoice_number: InvoiceNumber, now: DateTime<Utc>) -> Self {
        Self {
            id: InvoiceId::new(),
            invoice_number,
            payment_id: new.payment_id,
            booking_id: new.booking_id,
            user_id: new.user_id,
            host_id: new.host_id,
            issue_date: new.issue_date,
            amount: new.settlement.gross,
            commission: new.settlement.commission,
            vat: new.settlement.vat,
            host_amount: new.settlement.host_amount,
            download_count: 0,
            created_at: now,
        }
    }

    /// Guests and hosts may read and download their invoices
    pub fn is_visible_to(&self, user_id: UserId) -> bool {
        self.user_id == user_id || self.host_id == user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_format() {
        let n = InvoiceNumber::new("INV", 2025, 42).unwrap();
        assert_eq!(n.to_string(), "INV-2025-000042");
    }

    #[test]
    fn test_number_parse() {
        let n: InvoiceNumber = "INV-2025-000042".parse().unwrap();
        assert_eq!((n.prefix(), n.year(), n.seq()), ("INV", 2025, 42));
        assert!("INV-2025".parse::<InvoiceNumber>().is_err());
        assert!("INV-20x5-000001".parse::<InvoiceNumber>().is_err());
        assert!("INV-2025-000000".parse::<InvoiceNumber>().is_err());
    }

    #[test]
    fn test_numbers_sort_lexically_within_year() {
        let a = InvoiceNumber::new("INV", 2025, 9).unwrap().to_string();
        let b = InvoiceNumber::new("INV", 2025, 10).unwrap().to_string();
        assert!(a < b);
    }

    #[test]
    fn test_number_serializes_as_string() {
        let n = InvoiceNumber::new("CM", 2026, 7).unwrap();
        assert_eq!(serde_json::to_value(&n).unwrap(), serde_json::json!("CM-2026-000007"));
    }
}
