//! Pricing Domain - Host Tariffs
//!
//! A tariff is a host's published (duration, price) offering with optional
//! add-on services. This crate owns the tariff model and its invariants:
//!
//! - (host, duration) identifies a tariff; writes are insert-or-update
//! - at most [`DEFAULT_MAX_ACTIVE_TARIFFS`] active tariffs per host
//! - at most one primary tariff per host, and it must be active
//! - a tariff referenced by a live booking cannot be deleted
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_pricing::{TariffStore, TariffFields, AddonFlags};
//!
//! let store = TariffStore::new(port);
//! let tariff = store
//!     .upsert(host_id, 60, TariffFields::active(price, AddonFlags::none()))
//!     .await?;
//! store.set_primary(tariff.id, host_id).await?;
//! ```

pub mod tariff;
pub mod schedule;
pub mod ports;
pub mod store;
pub mod error;

pub use tariff::{Tariff, TariffFields, AddonFlags, Addon, MAX_DURATION_MINUTES};
pub use schedule::HostSchedule;
pub use ports::{TariffPort, UpsertTariff, UpsertOutcome, DeleteOutcome, PriceRange};
pub use store::{TariffStore, DEFAULT_MAX_ACTIVE_TARIFFS};
pub use error::PricingError;
