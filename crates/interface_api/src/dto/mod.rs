//! Request and response bodies
//!
//! All bodies are camelCase JSON. Responses flatten `Money` into an amount
//! plus an ISO currency code.

pub mod pricing;
pub mod booking;
pub mod payment;
pub mod verification;
pub mod invoice;
