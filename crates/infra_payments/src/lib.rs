//! Payment Processor Infrastructure
//!
//! [`StripeProcessor`] implements `domain_billing::PaymentProcessor` against
//! a Stripe-compatible REST API: form-encoded requests, amounts in minor
//! units, an `Idempotency-Key` header on every create.

pub mod stripe;

pub use stripe::{StripeConfig, StripeProcessor};
