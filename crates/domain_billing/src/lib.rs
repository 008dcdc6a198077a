//! Billing Domain - Settlement, Invoicing and Webhook Reconciliation
//!
//! Money flows through three steps:
//!
//! 1. [`PaymentAdapter`] prices a pending booking (tariff price plus
//!    add-ons), splits it with the [`CommissionCalculator`] and asks the
//!    processor for a payment intent. A pending [`Payment`] is stored.
//! 2. The processor calls back. [`WebhookReconciler`] verifies the
//!    signature, claims the event id in the ledger and replays idempotent
//!    steps: payment succeeded, booking confirmed, invoice issued.
//! 3. [`InvoiceSequencer`] allocates `PREFIX-YEAR-SEQ` numbers in the same
//!    transaction as the invoice insert, so numbers never repeat or skip.
//!
//! # Commission
//!
//! ```text
//! commission = round2(gross * commission_rate)
//! vat        = round2(commission * vat_rate)
//! host       = gross - commission - vat
//! ```
//!
//! Rounding is half up at each step, so the three parts always add back to
//! the gross amount to the cent.

pub mod commission;
pub mod payment;
pub mod invoice;
pub mod ports;
pub mod sequencer;
pub mod processor;
pub mod adapter;
pub mod webhook;
pub mod reconciler;
pub mod error;

pub use commission::{CommissionCalculator, Settlement};
pub use payment::{Payment, PaymentStatus, FeeSplit};
pub use invoice::{Invoice, InvoiceNumber, NewInvoice};
pub use ports::{
    PaymentPort, PaymentChange, RearmPayment, InvoicePort, IssueOutcome, WebhookLedgerPort, EventClaim,
};
pub use sequencer::{InvoiceSequencer, DEFAULT_INVOICE_PREFIX};
pub use processor::{
    PaymentProcessor, ProcessorError, CreateIntentRequest, ProcessorIntent, IntentStatus, Transfer,
};
pub use adapter::{PaymentAdapter, AddonPricing, IntentHandle, IntentStatusView};
pub use webhook::{SignatureVerifier, SignatureError, WebhookEvent, EventKind, DEFAULT_TOLERANCE_SECS};
pub use reconciler::{WebhookReconciler, ReconcileOutcome};
pub use error::BillingError;
