//! Booking aggregate and status machine

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{BookingId, BookingParty, Money, TariffId, UserId};
use domain_pricing::{Addon, Tariff};

use crate::error::BookingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Pending and confirmed bookings hold their slot
    pub fn is_open(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (*self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Confirmed, BookingStatus::Completed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }

    /// Statuses from which `next` is reachable in one step
    pub fn sources_of(next: BookingStatus) -> Vec<BookingStatus> {
        [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Completed,
            BookingStatus::Cancelled,
        ]
        .into_iter()
        .filter(|s| s.can_transition_to(next))
        .collect()
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(BookingError::validation(format!("unknown booking status '{}'", other))),
        }
    }
}

/// The (host, date, start) a session occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub host_id: UserId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: BookingId,
    pub host_id: UserId,
    pub guest_id: UserId,
    pub tariff_id: TariffId,
    pub scheduled_date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: u32,
    /// Copied from the tariff at creation
    pub price: Money,
    pub status: BookingStatus,
    pub services: Vec<Addon>,
    pub notes: Option<String>,
    pub cancelled_by: Option<BookingParty>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// A pending booking priced from `tariff`
    pub fn from_tariff(
        tariff: &Tariff,
        guest_id: UserId,
        scheduled_date: NaiveDate,
        start_time: NaiveTime,
        mut services: Vec<Addon>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        services.sort();
        services.dedup();
        Self {
            id: BookingId::new(),
            host_id: tariff.host_id,
            guest_id,
            tariff_id: tariff.id,
            scheduled_date,
            start_time,
            duration_minutes: tariff.duration_minutes,
            price: tariff.price,
            status: BookingStatus::Pending,
            services,
            notes,
            cancelled_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn slot(&self) -> Slot {
        Slot {
            host_id: self.host_id,
            date: self.scheduled_date,
            start_time: self.start_time,
        }
    }

    /// Which side `user_id` is on, if any
    pub fn party_of(&self, user_id: UserId) -> Option<BookingParty> {
        if user_id == self.host_id {
            Some(BookingParty::Host)
        } else if user_id == self.guest_id {
            Some(BookingParty::Guest)
        } else {
            None
        }
    }

    pub fn user_for(&self, party: BookingParty) -> UserId {
        match party {
            BookingParty::Host => self.host_id,
            BookingParty::Guest => self.guest_id,
        }
    }
}
