//! Booking Domain - Session Lifecycle
//!
//! ```text
//! pending -> confirmed -> completed
//!    |           |
//!    +-----------+--> cancelled
//! ```
//!
//! Guests and hosts may only create and cancel. Confirmation comes from the
//! payment webhook and completion from the session-end signal. Every status
//! change is a compare-and-swap in the store, and the store refuses a second
//! open booking for the same host slot.

pub mod booking;
pub mod ports;
pub mod service;
pub mod error;

pub use booking::{Booking, BookingStatus, Slot};
pub use ports::{BookingPort, StatusChange};
pub use service::{BookingService, CreateBooking};
pub use error::BookingError;
