//! Storage Infrastructure
//!
//! Implementations of the domain storage ports:
//!
//! - [`adapters`]: PostgreSQL, one adapter per port, built on SQLx with the
//!   schema in `migrations/`
//! - [`memory::InMemoryStore`]: every port over shared in-process state
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresTariffAdapter};
//!
//! let pool = create_pool(DatabaseConfig::new(url)).await?;
//! run_migrations(&pool).await?;
//! let tariffs = Arc::new(PostgresTariffAdapter::new(pool.clone()));
//! ```

pub mod pool;
pub mod error;
pub mod adapters;
pub mod memory;

pub use pool::{DatabasePool, DatabaseConfig, PoolHealth, create_pool, run_migrations};
pub use error::DatabaseError;
pub use adapters::{
    PostgresTariffAdapter, PostgresBookingAdapter, PostgresPaymentAdapter, PostgresInvoiceAdapter,
    PostgresVerificationAdapter, PostgresWebhookLedger,
};
pub use memory::InMemoryStore;
