//! Core Kernel - Foundational types for the consultation marketplace
//!
//! This crate provides the building blocks shared by every domain crate:
//! - Money types with precise decimal arithmetic and half-up rounding
//! - Strongly-typed identifiers for marketplace entities
//! - Port error and health-check types for the ports-and-adapters seams
//! - An injectable clock so expiry rules can be tested deterministically
//! - The outbound notification boundary shared by booking and verification

pub mod money;
pub mod temporal;
pub mod identifiers;
pub mod ports;
pub mod notify;

pub use money::{Money, Currency, MoneyError, Rate};
pub use temporal::{Clock, SystemClock, ManualClock};
pub use identifiers::{
    UserId, TariffId, BookingId, PaymentId, InvoiceId, DocumentId,
};
pub use ports::{
    PortError, DomainPort, HealthCheckable, HealthCheckResult, AdapterHealth,
};
pub use notify::{Notification, NotificationPort, BookingParty};
