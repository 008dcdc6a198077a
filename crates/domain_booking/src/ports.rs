//! Booking Domain Ports
//!
//! The store guarantees two things atomically: at most one open booking per
//! (host, date, start) slot, and status changes that only apply when the
//! current status is one of the expected ones.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use core_kernel::{BookingId, BookingParty, DomainPort, PortError, UserId};

use crate::booking::{Booking, BookingStatus};

/// A compare-and-swap on a booking's status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub booking_id: BookingId,
    pub from: Vec<BookingStatus>,
    pub to: BookingStatus,
    pub cancelled_by: Option<BookingParty>,
    pub at: DateTime<Utc>,
}

impl StatusChange {
    /// A change from every status that can legally reach `to`
    pub fn to(booking_id: BookingId, to: BookingStatus, at: DateTime<Utc>) -> Self {
        Self {
            booking_id,
            from: BookingStatus::sources_of(to),
            to,
            cancelled_by: None,
            at,
        }
    }

    pub fn cancelled_by(mut self, party: BookingParty) -> Self {
        self.cancelled_by = Some(party);
        self
    }
}

#[async_trait]
pub trait BookingPort: DomainPort {
    /// Inserts a new booking
    ///
    /// # Errors
    ///
    /// `PortError::Conflict` when an open booking already holds the slot
    async fn insert_booking(&self, booking: Booking) -> Result<Booking, PortError>;

    async fn get_booking(&self, booking_id: BookingId) -> Result<Option<Booking>, PortError>;

    /// Applies `change` if the stored status is in `change.from`
    ///
    /// Returns `None` when the status did not match, and
    /// `PortError::NotFound` when the booking does not exist.
    async fn transition_status(&self, change: StatusChange) -> Result<Option<Booking>, PortError>;

    /// Bookings where the user is host or guest, newest session first
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, PortError>;
}

/// In-memory implementation of BookingPort for unit tests
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[derive(Debug, Default, Clone)]
    pub struct MockBookingPort {
        bookings: Arc<RwLock<HashMap<BookingId, Booking>>>,
    }

    impl MockBookingPort {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl DomainPort for MockBookingPort {}

    #[async_trait]
    impl BookingPort for MockBookingPort {
        async fn insert_booking(&self, booking: Booking) -> Result<Booking, PortError> {
            let mut bookings = self.bookings.write().await;
            let slot = booking.slot();
            if bookings.values().any(|b| b.status.is_open() && b.slot() == slot) {
                return Err(PortError::conflict("slot already booked"));
            }
            bookings.insert(booking.id, booking.clone());
            Ok(booking)
        }

        async fn get_booking(&self, booking_id: BookingId) -> Result<Option<Booking>, PortError> {
            Ok(self.bookings.read().await.get(&booking_id).cloned())
        }

        async fn transition_status(&self, change: StatusChange) -> Result<Option<Booking>, PortError> {
            let mut bookings = self.bookings.write().await;
            let booking = bookings
                .get_mut(&change.booking_id)
                .ok_or_else(|| PortError::not_found("Booking", change.booking_id))?;
            if !change.from.contains(&booking.status) {
                return Ok(None);
            }
            booking.status = change.to;
            if change.cancelled_by.is_some() {
                booking.cancelled_by = change.cancelled_by;
            }
            booking.updated_at = change.at;
            Ok(Some(booking.clone()))
        }

        async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, PortError> {
            let bookings = self.bookings.read().await;
            let mut mine: Vec<Booking> = bookings
                .values()
                .filter(|b| b.host_id == user_id || b.guest_id == user_id)
                .cloned()
                .collect();
            mine.sort_by(|a, b| (b.scheduled_date, b.start_time).cmp(&(a.scheduled_date, a.start_time)));
            Ok(mine)
        }
    }
}
