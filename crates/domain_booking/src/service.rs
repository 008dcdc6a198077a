//! Booking service
//!
//! Guards booking creation on host verification and the tariff, and drives
//! every later status change through [`BookingPort::transition_status`].

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tracing::{info, instrument, warn};

use core_kernel::{BookingId, BookingParty, Clock, Notification, NotificationPort, TariffId, UserId};
use domain_pricing::{Addon, TariffPort};
use domain_verification::VerificationPort;

use crate::booking::{Booking, BookingStatus};
use crate::error::BookingError;
use crate::ports::{BookingPort, StatusChange};

const MAX_NOTES_LEN: usize = 2000;

/// Input for a new booking
#[derive(Debug, Clone)]
pub struct CreateBooking {
    pub host_id: UserId,
    pub guest_id: UserId,
    pub tariff_id: TariffId,
    pub scheduled_date: NaiveDate,
    pub start_time: NaiveTime,
    pub services: Vec<Addon>,
    pub notes: Option<String>,
}

#[derive(Clone)]
pub struct BookingService {
    bookings: Arc<dyn BookingPort>,
    tariffs: Arc<dyn TariffPort>,
    verifications: Arc<dyn VerificationPort>,
    notifier: Arc<dyn NotificationPort>,
    clock: Arc<dyn Clock>,
}

impl BookingService {
    pub fn new(
        bookings: Arc<dyn BookingPort>,
        tariffs: Arc<dyn TariffPort>,
        verifications: Arc<dyn VerificationPort>,
        notifier: Arc<dyn NotificationPort>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bookings,
            tariffs,
            verifications,
            notifier,
            clock,
        }
    }

    /// Creates a pending booking priced from the tariff
    ///
    /// # Errors
    ///
    /// - `HostNotBookable` unless the host's verification is approved
    /// - `TariffNotFound` when the tariff is missing, inactive or another host's
    /// - `Validation` for self-booking or add-ons the tariff does not offer
    /// - `SlotTaken` when an open booking already holds the slot
    #[instrument(skip(self, request), fields(host_id = %request.host_id, guest_id = %request.guest_id))]
    pub async fn create(&self, request: CreateBooking) -> Result<Booking, BookingError> {
        if request.host_id == request.guest_id {
            return Err(BookingError::validation("hosts cannot book themselves"));
        }
        if let Some(notes) = &request.notes {
            if notes.chars().count() > MAX_NOTES_LEN {
                return Err(BookingError::validation(format!(
                    "notes exceed {} characters",
                    MAX_NOTES_LEN
                )));
            }
        }

        let approved = self
            .verifications
            .get_verification(request.host_id)
            .await?
            .map(|v| v.is_bookable())
            .unwrap_or(false);
        if !approved {
            return Err(BookingError::HostNotBookable(request.host_id.to_string()));
        }

        let tariff = self
            .tariffs
            .get_tariff(request.tariff_id)
            .await?
            .filter(|t| t.host_id == request.host_id && t.is_active)
            .ok_or_else(|| BookingError::TariffNotFound(request.tariff_id.to_string()))?;

        if !tariff.offers_all(&request.services) {
            return Err(BookingError::validation("requested add-on is not offered by this tariff"));
        }

        let booking = Booking::from_tariff(
            &tariff,
            request.guest_id,
            request.scheduled_date,
            request.start_time,
            request.services,
            request.notes,
            self.clock.now(),
        );

        let booking = self.bookings.insert_booking(booking).await.map_err(|err| {
            if err.is_conflict() {
                BookingError::SlotTaken
            } else {
                BookingError::from(err)
            }
        })?;

        info!(booking_id = %booking.id, date = %booking.scheduled_date, start = %booking.start_time, "Booking created");
        for party in [BookingParty::Host, BookingParty::Guest] {
            self.send(Notification::BookingCreated {
                recipient: booking.user_for(party),
                booking_id: booking.id,
                role: party,
            })
            .await;
        }
        Ok(booking)
    }

    /// Cancels on behalf of the host or the guest
    ///
    /// Cancelling an already cancelled booking succeeds without notifying
    /// anyone again.
    #[instrument(skip(self), fields(booking_id = %booking_id, actor_id = %actor_id))]
    pub async fn cancel(&self, booking_id: BookingId, actor_id: UserId) -> Result<Booking, BookingError> {
        let booking = self.load(booking_id).await?;
        let party = booking
            .party_of(actor_id)
            .ok_or_else(|| BookingError::Forbidden(booking_id.to_string()))?;

        if booking.status == BookingStatus::Cancelled {
            return Ok(booking);
        }

        let change = StatusChange::to(booking_id, BookingStatus::Cancelled, self.clock.now()).cancelled_by(party);
        let cancelled = match self.bookings.transition_status(change).await? {
            Some(updated) => updated,
            None => {
                let current = self.load(booking_id).await?;
                if current.status == BookingStatus::Cancelled {
                    return Ok(current);
                }
                return Err(BookingError::InvalidTransition {
                    from: current.status.to_string(),
                    to: BookingStatus::Cancelled.to_string(),
                });
            }
        };

        info!(cancelled_by = %party, "Booking cancelled");
        self.send(Notification::BookingCancelled {
            recipient: cancelled.user_for(party.counterpart()),
            booking_id,
            cancelled_by: party,
        })
        .await;
        Ok(cancelled)
    }

    /// Moves a paid booking to confirmed; only the payment webhook calls this
    ///
    /// Already confirmed or completed bookings are returned unchanged.
    /// A cancelled booking yields `InvalidTransition`.
    #[instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn confirm(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.advance(booking_id, BookingStatus::Confirmed, &[BookingStatus::Completed])
            .await
    }

    /// Marks a confirmed session as held; only the session-end signal calls this
    #[instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn complete(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.advance(booking_id, BookingStatus::Completed, &[]).await
    }

    /// Reads a booking the actor is a party to
    pub async fn get(&self, booking_id: BookingId, actor_id: UserId) -> Result<Booking, BookingError> {
        let booking = self.load(booking_id).await?;
        if booking.party_of(actor_id).is_none() {
            return Err(BookingError::Forbidden(booking_id.to_string()));
        }
        Ok(booking)
    }

    /// Reads a booking without a party check, for system callers
    pub async fn find(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.load(booking_id).await
    }

    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Booking>, BookingError> {
        Ok(self.bookings.list_for_user(user_id).await?)
    }

    /// Forward-only move to `target`; `beyond` are later statuses that also
    /// count as already done
    async fn advance(
        &self,
        booking_id: BookingId,
        target: BookingStatus,
        beyond: &[BookingStatus],
    ) -> Result<Booking, BookingError> {
        let change = StatusChange::to(booking_id, target, self.clock.now());
        if let Some(updated) = self.bookings.transition_status(change).await? {
            info!(status = %target, "Booking status changed");
            return Ok(updated);
        }

        let current = self.load(booking_id).await?;
        if current.status == target || beyond.contains(&current.status) {
            return Ok(current);
        }
        Err(BookingError::InvalidTransition {
            from: current.status.to_string(),
            to: target.to_string(),
        })
    }

    async fn load(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.bookings
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(booking_id.to_string()))
    }

    async fn send(&self, notification: Notification) {
        let kind = notification.kind();
        if let Err(err) = self.notifier.notify(notification).await {
            warn!(kind, error = %err, "Notification delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_kernel::notify::mock::RecordingNotifier;
    use core_kernel::{Currency, ManualClock, Money};
    use domain_pricing::ports::mock::MockTariffPort;
    use domain_pricing::{AddonFlags, TariffFields, TariffStore};
    use domain_verification::ports::mock::MockVerificationPort;
    use domain_verification::HostVerification;
    use rust_decimal_macros::dec;

    use crate::ports::mock::MockBookingPort;

    struct Fixture {
        service: BookingService,
        tariffs: TariffStore,
        verifications: Arc<MockVerificationPort>,
        notifier: RecordingNotifier,
    }

    fn fixture() -> Fixture {
        let tariff_port = Arc::new(MockTariffPort::new());
        let verifications = Arc::new(MockVerificationPort::new());
        let notifier = RecordingNotifier::new();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 5, 20, 8, 0, 0).unwrap()));
        let service = BookingService::new(
            Arc::new(MockBookingPort::new()),
            tariff_port.clone(),
            verifications.clone(),
            Arc::new(notifier.clone()),
            clock,
        );
        Fixture {
            service,
            tariffs: TariffStore::new(tariff_port),
            verifications,
            notifier,
        }
    }

    async fn approved_host(f: &Fixture) -> UserId {
        let host = UserId::new();
        let mut record = HostVerification::unregistered(host, Utc::now());
        record.approve_from_processor(Utc::now());
        f.verifications.insert(record).await;
        host
    }

    async fn tariff(f: &Fixture, host: UserId, addons: AddonFlags) -> TariffId {
        let fields = TariffFields::active(Money::new(dec!(100.00), Currency::EUR), addons);
        f.tariffs.upsert(host, 60, fields).await.unwrap().id
    }

    fn request(host: UserId, guest: UserId, tariff_id: TariffId) -> CreateBooking {
        CreateBooking {
            host_id: host,
            guest_id: guest,
            tariff_id,
            scheduled_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            services: vec![],
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_create_copies_tariff_and_notifies_both() {
        let f = fixture();
        let host = approved_host(&f).await;
        let guest = UserId::new();
        let tariff_id = tariff(&f, host, AddonFlags::none()).await;

        let booking = f.service.create(request(host, guest, tariff_id)).await.unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.duration_minutes, 60);
        assert_eq!(booking.price.amount(), dec!(100.00));
        assert_eq!(f.notifier.sent_to(host).len(), 1);
        assert_eq!(f.notifier.sent_to(guest).len(), 1);
    }

    #[tokio::test]
    async fn test_unapproved_host_rejected() {
        let f = fixture();
        let host = UserId::new();
        let tariff_id = tariff(&f, host, AddonFlags::none()).await;

        let err = f.service.create(request(host, UserId::new(), tariff_id)).await.unwrap_err();
        assert!(matches!(err, BookingError::HostNotBookable(_)));
    }

    #[tokio::test]
    async fn test_double_booking_scenario() {
        let f = fixture();
        let host = approved_host(&f).await;
        let tariff_id = tariff(&f, host, AddonFlags::none()).await;
        f.service.create(request(host, UserId::new(), tariff_id)).await.unwrap();

        let err = f.service.create(request(host, UserId::new(), tariff_id)).await.unwrap_err();
        assert!(matches!(err, BookingError::SlotTaken));
    }

    #[tokio::test]
    async fn test_cancelled_slot_can_be_rebooked() {
        let f = fixture();
        let host = approved_host(&f).await;
        let guest = UserId::new();
        let tariff_id = tariff(&f, host, AddonFlags::none()).await;
        let first = f.service.create(request(host, guest, tariff_id)).await.unwrap();
        f.service.cancel(first.id, guest).await.unwrap();

        assert!(f.service.create(request(host, UserId::new(), tariff_id)).await.is_ok());
    }

    #[tokio::test]
    async fn test_unoffered_addon_rejected() {
        let f = fixture();
        let host = approved_host(&f).await;
        let tariff_id = tariff(&f, host, AddonFlags::none().with(Addon::Recording)).await;
        let mut req = request(host, UserId::new(), tariff_id);
        req.services = vec![Addon::Translation];

        assert!(matches!(f.service.create(req).await, Err(BookingError::Validation(_))));
    }

    #[tokio::test]
    async fn test_tariff_of_other_host_not_found() {
        let f = fixture();
        let host = approved_host(&f).await;
        let other = approved_host(&f).await;
        let foreign = tariff(&f, other, AddonFlags::none()).await;

        assert!(matches!(
            f.service.create(request(host, UserId::new(), foreign)).await,
            Err(BookingError::TariffNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_by_stranger_forbidden() {
        let f = fixture();
        let host = approved_host(&f).await;
        let tariff_id = tariff(&f, host, AddonFlags::none()).await;
        let booking = f.service.create(request(host, UserId::new(), tariff_id)).await.unwrap();

        assert!(matches!(
            f.service.cancel(booking.id, UserId::new()).await,
            Err(BookingError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_and_notifies_other_party_once() {
        let f = fixture();
        let host = approved_host(&f).await;
        let guest = UserId::new();
        let tariff_id = tariff(&f, host, AddonFlags::none()).await;
        let booking = f.service.create(request(host, guest, tariff_id)).await.unwrap();
        f.notifier.clear();

        let cancelled = f.service.cancel(booking.id, host).await.unwrap();
        let again = f.service.cancel(booking.id, guest).await.unwrap();

        assert_eq!(cancelled.cancelled_by, Some(BookingParty::Host));
        assert_eq!(again.cancelled_by, Some(BookingParty::Host));
        let sent = f.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient(), guest);
    }

    #[tokio::test]
    async fn test_lifecycle_and_completed_is_final() {
        let f = fixture();
        let host = approved_host(&f).await;
        let guest = UserId::new();
        let tariff_id = tariff(&f, host, AddonFlags::none()).await;
        let booking = f.service.create(request(host, guest, tariff_id)).await.unwrap();

        assert!(matches!(
            f.service.complete(booking.id).await,
            Err(BookingError::InvalidTransition { .. })
        ));
        assert_eq!(f.service.confirm(booking.id).await.unwrap().status, BookingStatus::Confirmed);
        assert_eq!(f.service.confirm(booking.id).await.unwrap().status, BookingStatus::Confirmed);
        assert_eq!(f.service.complete(booking.id).await.unwrap().status, BookingStatus::Completed);
        assert_eq!(f.service.confirm(booking.id).await.unwrap().status, BookingStatus::Completed);

        assert!(matches!(
            f.service.cancel(booking.id, guest).await,
            Err(BookingError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_confirm_cancelled_booking_fails() {
        let f = fixture();
        let host = approved_host(&f).await;
        let guest = UserId::new();
        let tariff_id = tariff(&f, host, AddonFlags::none()).await;
        let booking = f.service.create(request(host, guest, tariff_id)).await.unwrap();
        f.service.cancel(booking.id, guest).await.unwrap();

        assert!(matches!(
            f.service.confirm(booking.id).await,
            Err(BookingError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_self_booking_rejected() {
        let f = fixture();
        let host = approved_host(&f).await;
        let tariff_id = tariff(&f, host, AddonFlags::none()).await;

        assert!(matches!(
            f.service.create(request(host, host, tariff_id)).await,
            Err(BookingError::Validation(_))
        ));
    }
}
