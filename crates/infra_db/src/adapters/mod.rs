//! PostgreSQL adapters for the domain ports
//!
//! Each adapter owns the SQL for one port and maps rows to domain types.
//! Operations that must look atomic run in a single transaction:
//!
//! | port | mechanism |
//! |---|---|
//! | `TariffPort` | per-host `pg_advisory_xact_lock`, `ON CONFLICT (host_id, duration_minutes)` |
//! | `BookingPort` | partial unique index on open slots, `UPDATE ... WHERE status = ANY(..) RETURNING` |
//! | `InvoicePort` | `invoice_counters` upsert and invoice insert in one transaction |
//! | `WebhookLedgerPort` | `INSERT ... ON CONFLICT DO UPDATE ... RETURNING` |
//! | `VerificationPort` | status-guarded `UPDATE`, documents in the same transaction |

pub mod tariff;
pub mod booking;
pub mod payment;
pub mod invoice;
pub mod verification;
pub mod webhook;

pub use tariff::PostgresTariffAdapter;
pub use booking::PostgresBookingAdapter;
pub use payment::PostgresPaymentAdapter;
pub use invoice::PostgresInvoiceAdapter;
pub use verification::PostgresVerificationAdapter;
pub use webhook::PostgresWebhookLedger;

use rust_decimal::Decimal;

use core_kernel::{Currency, Money};

use crate::error::DatabaseError;

pub(crate) fn money(amount: Decimal, currency: &str) -> Result<Money, DatabaseError> {
    let currency: Currency = currency
        .parse()
        .map_err(|_| DatabaseError::decode(format!("unknown currency '{}'", currency)))?;
    Ok(Money::new(amount, currency))
}

pub(crate) fn to_u32(value: i32, column: &str) -> Result<u32, DatabaseError> {
    u32::try_from(value).map_err(|_| DatabaseError::decode(format!("negative {}: {}", column, value)))
}
