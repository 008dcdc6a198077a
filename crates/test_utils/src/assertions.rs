//! Custom Test Assertions
//!
//! Assertion helpers for domain types that give more meaningful failure
//! messages than a bare `assert_eq!`.

use core_kernel::Money;
use domain_billing::{Invoice, Settlement};
use domain_booking::{Booking, BookingStatus};
use rust_decimal::Decimal;

/// Asserts that a Money value has the given amount, compared by value
///
/// # Panics
///
/// Panics if the amounts differ; `100.0` and `100.00` are equal.
pub fn assert_money_eq(actual: &Money, expected: Decimal) {
    assert_eq!(
        actual.amount(),
        expected,
        "Money amount mismatch: actual={} {}, expected={}",
        actual.amount(),
        actual.currency(),
        expected
    );
}

/// Asserts that the parts of a settlement add back to its gross
pub fn assert_settlement_balances(settlement: &Settlement) {
    let parts = settlement.commission.amount() + settlement.vat.amount() + settlement.host_amount.amount();
    assert_eq!(
        parts,
        settlement.gross.amount(),
        "Settlement does not balance: commission={} vat={} host={} gross={}",
        settlement.commission.amount(),
        settlement.vat.amount(),
        settlement.host_amount.amount(),
        settlement.gross.amount()
    );
    assert!(
        settlement.host_amount.amount() >= Decimal::ZERO,
        "Host amount is negative: {}",
        settlement.host_amount.amount()
    );
}

pub fn assert_booking_status(booking: &Booking, expected: BookingStatus) {
    assert_eq!(
        booking.status, expected,
        "Booking {} is {}, expected {}",
        booking.id, booking.status, expected
    );
}

/// Asserts that `invoices` use exactly the sequence numbers 1..=n for one year
///
/// # Panics
///
/// Panics on a gap, a duplicate, or invoices from different years or prefixes.
pub fn assert_gap_free(invoices: &[Invoice]) {
    let Some(first) = invoices.first() else {
        return;
    };
    let year = first.invoice_number.year();
    let prefix = first.invoice_number.prefix().to_string();

    let mut seqs: Vec<u64> = invoices
        .iter()
        .map(|invoice| {
            assert_eq!(invoice.invoice_number.year(), year, "Invoices span years");
            assert_eq!(invoice.invoice_number.prefix(), prefix, "Invoices use different prefixes");
            invoice.invoice_number.seq()
        })
        .collect();
    seqs.sort_unstable();

    let expected: Vec<u64> = (1..=invoices.len() as u64).collect();
    assert_eq!(seqs, expected, "Invoice numbers are not gap-free");
}
