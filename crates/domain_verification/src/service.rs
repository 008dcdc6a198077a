//! Verification service
//!
//! Loads the host's record, runs the transition on it and writes it back
//! with a compare-and-swap on the starting status.

use std::sync::Arc;

use chrono::Duration;
use tracing::{info, instrument, warn};

use core_kernel::{Clock, Notification, NotificationPort, UserId};

use crate::document::{DocumentDecision, NewDocument, VerificationDocument};
use crate::error::VerificationError;
use crate::ports::{DocumentStamp, VerificationPort, VerificationWrite};
use crate::verification::{HostVerification, Reviewer, DEFAULT_TOKEN_TTL_HOURS};

#[derive(Clone)]
pub struct VerificationService {
    port: Arc<dyn VerificationPort>,
    notifier: Arc<dyn NotificationPort>,
    clock: Arc<dyn Clock>,
    token_ttl: Duration,
}

impl VerificationService {
    pub fn new(
        port: Arc<dyn VerificationPort>,
        notifier: Arc<dyn NotificationPort>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            port,
            notifier,
            clock,
            token_ttl: Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
        }
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// The stored record, or an unregistered one
    pub async fn status(&self, user_id: UserId) -> Result<HostVerification, VerificationError> {
        Ok(self
            .port
            .get_verification(user_id)
            .await?
            .unwrap_or_else(|| HostVerification::unregistered(user_id, self.clock.now())))
    }

    pub async fn is_bookable(&self, user_id: UserId) -> Result<bool, VerificationError> {
        Ok(self.status(user_id).await?.is_bookable())
    }

    pub async fn documents(&self, user_id: UserId) -> Result<Vec<VerificationDocument>, VerificationError> {
        Ok(self.port.list_documents(user_id).await?)
    }

    /// Issues (or re-issues) the activation token and sends the link
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn request(&self, user_id: UserId) -> Result<HostVerification, VerificationError> {
        let mut record = self.status(user_id).await?;
        let expected = record.status;
        let now = self.clock.now();

        let token = record.request(self.token_ttl, now)?;
        let expires_at = now + self.token_ttl;
        let stored = self.port.write_verification(VerificationWrite::new(record, expected)).await?;

        info!(status = %stored.status, "Verification requested");
        self.send(Notification::ActivationRequested { user_id, token, expires_at }).await;
        Ok(stored)
    }

    /// Records uploaded documents
    #[instrument(skip(self, uploads), fields(user_id = %user_id, count = uploads.len()))]
    pub async fn submit_documents(
        &self,
        user_id: UserId,
        uploads: Vec<NewDocument>,
    ) -> Result<HostVerification, VerificationError> {
        if uploads.is_empty() {
            return Err(VerificationError::validation("at least one document is required"));
        }
        let now = self.clock.now();
        let documents = uploads
            .into_iter()
            .map(|upload| VerificationDocument::new(user_id, upload, now))
            .collect::<Result<Vec<_>, _>>()?;

        let mut record = self.status(user_id).await?;
        let expected = record.status;
        record.submit_documents(now)?;

        let write = VerificationWrite::new(record, expected).with_documents(documents);
        let stored = self.port.write_verification(write).await?;
        info!(status = %stored.status, "Verification documents submitted");
        Ok(stored)
    }

    /// Consumes the token for `user_id`
    #[instrument(skip(self, token), fields(user_id = %user_id))]
    pub async fn activate(&self, user_id: UserId, token: &str) -> Result<HostVerification, VerificationError> {
        let record = self
            .port
            .get_verification(user_id)
            .await?
            .ok_or(VerificationError::InvalidToken)?;
        self.consume_token(record, token).await
    }

    /// Consumes a token from an emailed link; the token identifies the host
    #[instrument(skip(self, token))]
    pub async fn activate_by_token(&self, token: &str) -> Result<HostVerification, VerificationError> {
        let record = self
            .port
            .find_by_token(token)
            .await?
            .ok_or(VerificationError::InvalidToken)?;
        self.consume_token(record, token).await
    }

    async fn consume_token(
        &self,
        mut record: HostVerification,
        token: &str,
    ) -> Result<HostVerification, VerificationError> {
        let expected = record.status;
        record.activate(token, self.clock.now())?;
        let stored = self.port.write_verification(VerificationWrite::new(record, expected)).await?;
        info!(user_id = %stored.user_id, "Verification activated, awaiting review");
        Ok(stored)
    }

    #[instrument(skip(self), fields(user_id = %user_id, admin_id = %admin_id))]
    pub async fn approve(&self, user_id: UserId, admin_id: UserId) -> Result<HostVerification, VerificationError> {
        let mut record = self.existing(user_id).await?;
        let expected = record.status;
        let now = self.clock.now();
        record.approve(admin_id, now)?;

        let stamp = DocumentStamp {
            decision: DocumentDecision::Approved,
            reviewer: Reviewer::Admin(admin_id),
            at: now,
        };
        let stored = self
            .port
            .write_verification(VerificationWrite::new(record, expected).with_stamp(stamp))
            .await?;
        info!("Host verification approved");
        self.send(Notification::VerificationApproved { user_id }).await;
        Ok(stored)
    }

    #[instrument(skip(self, reason), fields(user_id = %user_id, admin_id = %admin_id))]
    pub async fn reject(
        &self,
        user_id: UserId,
        admin_id: UserId,
        reason: &str,
    ) -> Result<HostVerification, VerificationError> {
        let mut record = self.existing(user_id).await?;
        let expected = record.status;
        let now = self.clock.now();
        record.reject(admin_id, reason, now)?;

        let stamp = DocumentStamp {
            decision: DocumentDecision::Rejected,
            reviewer: Reviewer::Admin(admin_id),
            at: now,
        };
        let stored = self
            .port
            .write_verification(VerificationWrite::new(record, expected).with_stamp(stamp))
            .await?;
        info!("Host verification rejected");
        let reason = stored.rejection_reason.clone().unwrap_or_default();
        self.send(Notification::VerificationRejected { user_id, reason }).await;
        Ok(stored)
    }

    /// Approval driven by a payable connected account
    ///
    /// Returns `None` when no host owns `account_id`.
    #[instrument(skip(self))]
    pub async fn approve_from_processor(
        &self,
        account_id: &str,
    ) -> Result<Option<HostVerification>, VerificationError> {
        let Some(mut record) = self.port.find_by_connected_account(account_id).await? else {
            return Ok(None);
        };
        if record.is_bookable() && record.payouts_enabled {
            return Ok(Some(record));
        }

        let expected = record.status;
        let user_id = record.user_id;
        let now = self.clock.now();
        let newly_approved = record.approve_from_processor(now);

        let mut write = VerificationWrite::new(record, expected);
        if newly_approved {
            write = write.with_stamp(DocumentStamp {
                decision: DocumentDecision::Approved,
                reviewer: Reviewer::Processor,
                at: now,
            });
        }
        let stored = self.port.write_verification(write).await?;

        if newly_approved {
            info!(user_id = %user_id, "Host approved by payment processor");
            self.send(Notification::VerificationApproved { user_id }).await;
        } else {
            info!(user_id = %user_id, "Payouts enabled for approved host");
        }
        Ok(Some(stored))
    }

    /// Stores that the processor can no longer pay out to `account_id`;
    /// the verification status is left as is
    #[instrument(skip(self))]
    pub async fn disable_payouts(&self, account_id: &str) -> Result<Option<HostVerification>, VerificationError> {
        let Some(mut record) = self.port.find_by_connected_account(account_id).await? else {
            return Ok(None);
        };
        if !record.payouts_enabled {
            return Ok(Some(record));
        }
        let expected = record.status;
        record.disable_payouts(self.clock.now());
        let stored = self.port.write_verification(VerificationWrite::new(record, expected)).await?;
        info!(user_id = %stored.user_id, "Payouts disabled");
        Ok(Some(stored))
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn link_payout_account(
        &self,
        user_id: UserId,
        account_id: &str,
    ) -> Result<HostVerification, VerificationError> {
        let mut record = self.status(user_id).await?;
        let expected = record.status;
        record.link_payout_account(account_id, self.clock.now())?;
        let stored = self.port.write_verification(VerificationWrite::new(record, expected)).await?;
        info!(account_id, "Payout account linked");
        Ok(stored)
    }

    async fn existing(&self, user_id: UserId) -> Result<HostVerification, VerificationError> {
        self.port
            .get_verification(user_id)
            .await?
            .ok_or_else(|| VerificationError::NotFound(user_id.to_string()))
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
    use crate::document::DocumentKind;
    use crate::ports::mock::MockVerificationPort;
    use crate::verification::VerificationStatus;
    use chrono::{TimeZone, Utc};
    use core_kernel::notify::mock::RecordingNotifier;
    use core_kernel::ManualClock;

    struct Fixture {
        service: VerificationService,
        port: Arc<MockVerificationPort>,
        notifier: RecordingNotifier,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        let port = Arc::new(MockVerificationPort::new());
        let notifier = RecordingNotifier::new();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap());
        let service = VerificationService::new(port.clone(), Arc::new(notifier.clone()), Arc::new(clock.clone()));
        Fixture { service, port, notifier, clock }
    }

    fn identity() -> Vec<NewDocument> {
        vec![NewDocument {
            kind: DocumentKind::Identity,
            storage_key: "docs/passport.pdf".to_string(),
        }]
    }

    async fn requested_with_documents(f: &Fixture, user: UserId) -> String {
        let record = f.service.request(user).await.unwrap();
        f.service.submit_documents(user, identity()).await.unwrap();
        record.activation_token.unwrap()
    }

    #[tokio::test]
    async fn test_token_expiry_scenario() {
        let f = fixture();
        let late = UserId::new();
        let token = requested_with_documents(&f, late).await;
        f.clock.advance(Duration::hours(25));
        assert!(matches!(f.service.activate(late, &token).await, Err(VerificationError::TokenExpired)));

        let f = fixture();
        let prompt = UserId::new();
        let token = requested_with_documents(&f, prompt).await;
        f.clock.advance(Duration::hours(23));
        let record = f.service.activate(prompt, &token).await.unwrap();
        assert_eq!(record.status, VerificationStatus::PendingReview);
        assert!(record.activation_token.is_none());
    }

    #[tokio::test]
    async fn test_activation_link_sent_with_token() {
        let f = fixture();
        let user = UserId::new();
        let record = f.service.request(user).await.unwrap();

        let sent = f.notifier.sent_to(user);
        assert_eq!(sent.len(), 1);
        assert!(matches!(
            &sent[0],
            Notification::ActivationRequested { token, .. } if Some(token) == record.activation_token.as_ref()
        ));
    }

    #[tokio::test]
    async fn test_activate_by_token_resolves_user() {
        let f = fixture();
        let user = UserId::new();
        let token = requested_with_documents(&f, user).await;

        let record = f.service.activate_by_token(&token).await.unwrap();

        assert_eq!(record.user_id, user);
        assert!(matches!(f.service.activate_by_token(&token).await, Err(VerificationError::InvalidToken)));
    }

    #[tokio::test]
    async fn test_approval_stamps_every_document() {
        let f = fixture();
        let user = UserId::new();
        let admin = UserId::new();
        let token = requested_with_documents(&f, user).await;
        f.service
            .submit_documents(
                user,
                vec![NewDocument { kind: DocumentKind::Qualification, storage_key: "docs/diploma.pdf".into() }],
            )
            .await
            .unwrap();
        f.service.activate(user, &token).await.unwrap();

        f.service.approve(user, admin).await.unwrap();

        assert!(f.service.is_bookable(user).await.unwrap());
        let documents = f.port.list_documents(user).await.unwrap();
        assert_eq!(documents.len(), 2);
        assert!(documents
            .iter()
            .all(|d| d.decision == DocumentDecision::Approved && d.reviewed_by == Some(Reviewer::Admin(admin))));
    }

    #[tokio::test]
    async fn test_reject_then_resubmit_returns_to_review() {
        let f = fixture();
        let user = UserId::new();
        let token = requested_with_documents(&f, user).await;
        f.service.activate(user, &token).await.unwrap();

        let rejected = f.service.reject(user, UserId::new(), "expired passport").await.unwrap();
        assert_eq!(rejected.rejection_reason.as_deref(), Some("expired passport"));

        let resubmitted = f.service.submit_documents(user, identity()).await.unwrap();
        assert_eq!(resubmitted.status, VerificationStatus::PendingReview);
        assert!(resubmitted.rejection_reason.is_none());
    }

    #[tokio::test]
    async fn test_approve_unknown_host_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.service.approve(UserId::new(), UserId::new()).await,
            Err(VerificationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_processor_approval_by_account() {
        let f = fixture();
        let user = UserId::new();
        f.service.link_payout_account(user, "acct_1").await.unwrap();

        let approved = f.service.approve_from_processor("acct_1").await.unwrap().unwrap();
        assert_eq!(approved.status, VerificationStatus::Approved);
        assert!(approved.payouts_enabled);

        let again = f.service.approve_from_processor("acct_1").await.unwrap().unwrap();
        assert_eq!(again.verified_by, Some(Reviewer::Processor));
        assert_eq!(f.notifier.count_kind("verification_approved"), 1);
        assert!(f.service.approve_from_processor("acct_unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disable_payouts_keeps_status() {
        let f = fixture();
        let user = UserId::new();
        f.service.link_payout_account(user, "acct_2").await.unwrap();
        f.service.approve_from_processor("acct_2").await.unwrap();

        let record = f.service.disable_payouts("acct_2").await.unwrap().unwrap();

        assert_eq!(record.status, VerificationStatus::Approved);
        assert!(!record.payouts_enabled);
    }

    #[tokio::test]
    async fn test_stale_write_conflicts() {
        let f = fixture();
        let user = UserId::new();
        f.service.request(user).await.unwrap();
        let stale = f.port.get_verification(user).await.unwrap().unwrap();
        f.service.submit_documents(user, identity()).await.unwrap();

        let write = VerificationWrite::new(stale.clone(), VerificationStatus::Requested);
        assert!(f.port.write_verification(write).await.unwrap_err().is_conflict());
    }
}
