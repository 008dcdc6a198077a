//! Outbound notifications
//!
//! Email rendering and delivery live outside this system. Services hand a
//! [`Notification`] to a [`NotificationPort`] and carry on; a failed delivery
//! is logged by the caller and never rolls back the state change that
//! triggered it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identifiers::{BookingId, InvoiceId, UserId};
use crate::ports::{DomainPort, PortError};

/// Which side of a booking acted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingParty {
    Host,
    Guest,
}

impl BookingParty {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingParty::Host => "host",
            BookingParty::Guest => "guest",
        }
    }

    /// The party on the other side
    pub fn counterpart(&self) -> Self {
        match self {
            BookingParty::Host => BookingParty::Guest,
            BookingParty::Guest => BookingParty::Host,
        }
    }
}

impl fmt::Display for BookingParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message for one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    /// Activation link for host verification
    ActivationRequested {
        user_id: UserId,
        token: String,
        expires_at: DateTime<Utc>,
    },
    VerificationApproved {
        user_id: UserId,
    },
    VerificationRejected {
        user_id: UserId,
        reason: String,
    },
    BookingCreated {
        recipient: UserId,
        booking_id: BookingId,
        role: BookingParty,
    },
    BookingCancelled {
        recipient: UserId,
        booking_id: BookingId,
        cancelled_by: BookingParty,
    },
    BookingConfirmed {
        recipient: UserId,
        booking_id: BookingId,
        invoice_id: InvoiceId,
        invoice_number: String,
    },
}

impl Notification {
    pub fn recipient(&self) -> UserId {
        match self {
            Notification::ActivationRequested { user_id, .. }
            | Notification::VerificationApproved { user_id }
            | Notification::VerificationRejected { user_id, .. } => *user_id,
            Notification::BookingCreated { recipient, .. }
            | Notification::BookingCancelled { recipient, .. }
            | Notification::BookingConfirmed { recipient, .. } => *recipient,
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::ActivationRequested { .. } => "activation_requested",
            Notification::VerificationApproved { .. } => "verification_approved",
            Notification::VerificationRejected { .. } => "verification_rejected",
            Notification::BookingCreated { .. } => "booking_created",
            Notification::BookingCancelled { .. } => "booking_cancelled",
            Notification::BookingConfirmed { .. } => "booking_confirmed",
        }
    }
}

#[async_trait]
pub trait NotificationPort: DomainPort {
    async fn notify(&self, notification: Notification) -> Result<(), PortError>;
}

/// Notifier that keeps every message in memory
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default, Clone)]
    pub struct RecordingNotifier {
        sent: Arc<Mutex<Vec<Notification>>>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn sent(&self) -> Vec<Notification> {
            self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
        }

        pub fn sent_to(&self, user_id: UserId) -> Vec<Notification> {
            self.sent().into_iter().filter(|n| n.recipient() == user_id).collect()
        }

        pub fn count_kind(&self, kind: &str) -> usize {
            self.sent().iter().filter(|n| n.kind() == kind).count()
        }

        pub fn clear(&self) {
            self.sent.lock().unwrap_or_else(|p| p.into_inner()).clear();
        }
    }

    impl DomainPort for RecordingNotifier {}

    #[async_trait]
    impl NotificationPort for RecordingNotifier {
        async fn notify(&self, notification: Notification) -> Result<(), PortError> {
            self.sent.lock().unwrap_or_else(|p| p.into_inner()).push(notification);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::mock::RecordingNotifier;

    #[test]
    fn test_counterpart() {
        assert_eq!(BookingParty::Host.counterpart(), BookingParty::Guest);
        assert_eq!(BookingParty::Guest.counterpart(), BookingParty::Host);
    }

    #[tokio::test]
    async fn test_recording_notifier_filters_by_recipient() {
        let notifier = RecordingNotifier::new();
        let host = UserId::new();
        let guest = UserId::new();
        let booking_id = BookingId::new();

        notifier
            .notify(Notification::BookingCreated { recipient: host, booking_id, role: BookingParty::Host })
            .await
            .unwrap();
        notifier
            .notify(Notification::BookingCreated { recipient: guest, booking_id, role: BookingParty::Guest })
            .await
            .unwrap();

        assert_eq!(notifier.sent_to(host).len(), 1);
        assert_eq!(notifier.count_kind("booking_created"), 2);
    }
}
