//! Host verification state machine
//!
//! Transitions are pure methods on [`HostVerification`]; they validate the
//! current state and mutate the record. The service persists the result with
//! a compare-and-swap on the status the transition started from.

use chrono::{DateTime, Duration, Utc};
use constant_time_eq::constant_time_eq;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use core_kernel::UserId;

use crate::error::VerificationError;

/// Activation links are valid for a day unless configured otherwise
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Unregistered,
    Requested,
    DocumentsSubmitted,
    PendingReview,
    Approved,
    Rejected,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Unregistered => "unregistered",
            VerificationStatus::Requested => "requested",
            VerificationStatus::DocumentsSubmitted => "documents_submitted",
            VerificationStatus::PendingReview => "pending_review",
            VerificationStatus::Approved => "approved",
            VerificationStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationStatus {
    type Err = VerificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unregistered" => Ok(VerificationStatus::Unregistered),
            "requested" => Ok(VerificationStatus::Requested),
            "documents_submitted" => Ok(VerificationStatus::DocumentsSubmitted),
            "pending_review" => Ok(VerificationStatus::PendingReview),
            "approved" => Ok(VerificationStatus::Approved),
            "rejected" => Ok(VerificationStatus::Rejected),
            other => Err(VerificationError::validation(format!("unknown verification status '{}'", other))),
        }
    }
}

/// Who decided a verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Reviewer {
    Admin(UserId),
    /// Approved because the payment processor reported a payable account
    Processor,
}

impl Reviewer {
    /// Storage form: the admin's uuid, or `processor`
    pub fn to_storage(&self) -> String {
        match self {
            Reviewer::Admin(id) => id.as_uuid().to_string(),
            Reviewer::Processor => "processor".to_string(),
        }
    }

    pub fn from_storage(value: &str) -> Result<Self, VerificationError> {
        if value == "processor" {
            return Ok(Reviewer::Processor);
        }
        value
            .parse::<UserId>()
            .map(Reviewer::Admin)
            .map_err(|_| VerificationError::validation(format!("invalid reviewer '{}'", value)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostVerification {
    pub user_id: UserId,
    pub status: VerificationStatus,
    #[serde(skip_serializing)]
    pub activation_token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub verified_by: Option<Reviewer>,
    pub verified_at: Option<DateTime<Utc>>,
    pub connected_account_id: Option<String>,
    pub payouts_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl HostVerification {
    /// A host that never asked to be verified
    pub fn unregistered(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            status: VerificationStatus::Unregistered,
            activation_token: None,
            token_expiry: None,
            rejection_reason: None,
            verified_by: None,
            verified_at: None,
            connected_account_id: None,
            payouts_enabled: false,
            updated_at: now,
        }
    }

    pub fn is_bookable(&self) -> bool {
        self.status == VerificationStatus::Approved
    }

    /// Whether payments can be split to the host's connected account
    pub fn can_receive_transfers(&self) -> bool {
        self.payouts_enabled && self.connected_account_id.is_some()
    }

    fn invalid(&self, action: &str) -> VerificationError {
        VerificationError::InvalidTransition {
            from: self.status.to_string(),
            action: action.to_string(),
        }
    }

    /// Issues a fresh activation token, replacing any previous one
    ///
    /// Allowed before review starts. A resend after documents were uploaded
    /// keeps `documents_submitted`.
    pub fn request(&mut self, ttl: Duration, now: DateTime<Utc>) -> Result<String, VerificationError> {
        match self.status {
            VerificationStatus::Unregistered | VerificationStatus::Requested => {
                self.status = VerificationStatus::Requested;
            }
            VerificationStatus::DocumentsSubmitted => {}
            _ => return Err(self.invalid("request")),
        }
        let token = Uuid::new_v4().simple().to_string();
        self.activation_token = Some(token.clone());
        self.token_expiry = Some(now + ttl);
        self.updated_at = now;
        Ok(token)
    }

    /// Records that documents were uploaded
    ///
    /// A rejected host goes straight back to review and loses the old
    /// rejection reason.
    pub fn submit_documents(&mut self, now: DateTime<Utc>) -> Result<(), VerificationError> {
        match self.status {
            VerificationStatus::Requested | VerificationStatus::DocumentsSubmitted => {
                self.status = VerificationStatus::DocumentsSubmitted;
            }
            VerificationStatus::Rejected => {
                self.status = VerificationStatus::PendingReview;
                self.rejection_reason = None;
            }
            _ => return Err(self.invalid("submit_documents")),
        }
        self.updated_at = now;
        Ok(())
    }

    /// Consumes the activation token and queues the host for review
    pub fn activate(&mut self, token: &str, now: DateTime<Utc>) -> Result<(), VerificationError> {
        match (&self.activation_token, self.token_expiry) {
            (Some(stored), Some(expiry)) if constant_time_eq(stored.as_bytes(), token.as_bytes()) => {
                if now > expiry {
                    return Err(VerificationError::TokenExpired);
                }
            }
            _ => return Err(VerificationError::InvalidToken),
        }
        if self.status != VerificationStatus::DocumentsSubmitted {
            return Err(self.invalid("activate"));
        }
        self.status = VerificationStatus::PendingReview;
        self.activation_token = None;
        self.token_expiry = None;
        self.updated_at = now;
        Ok(())
    }

    pub fn approve(&mut self, reviewer: UserId, now: DateTime<Utc>) -> Result<(), VerificationError> {
        if self.status != VerificationStatus::PendingReview {
            return Err(self.invalid("approve"));
        }
        self.mark_approved(Reviewer::Admin(reviewer), now);
        Ok(())
    }

    pub fn reject(&mut self, reviewer: UserId, reason: &str, now: DateTime<Utc>) -> Result<(), VerificationError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(VerificationError::validation("rejection reason is required"));
        }
        if self.status != VerificationStatus::PendingReview {
            return Err(self.invalid("reject"));
        }
        self.status = VerificationStatus::Rejected;
        self.rejection_reason = Some(reason.to_string());
        self.verified_by = Some(Reviewer::Admin(reviewer));
        self.verified_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Approval reported by the payment processor
    ///
    /// Returns false when the host was already approved; nothing changes.
    pub fn approve_from_processor(&mut self, now: DateTime<Utc>) -> bool {
        self.payouts_enabled = true;
        if self.status == VerificationStatus::Approved {
            return false;
        }
        self.mark_approved(Reviewer::Processor, now);
        true
    }

    /// Attaches the processor's connected account; payouts stay off until the
    /// processor reports the account payable
    pub fn link_payout_account(&mut self, account_id: &str, now: DateTime<Utc>) -> Result<(), VerificationError> {
        let account_id = account_id.trim();
        if account_id.is_empty() {
            return Err(VerificationError::validation("connected account id is required"));
        }
        if self.connected_account_id.as_deref() != Some(account_id) {
            self.connected_account_id = Some(account_id.to_string());
            self.payouts_enabled = false;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn disable_payouts(&mut self, now: DateTime<Utc>) {
        self.payouts_enabled = false;
        self.updated_at = now;
    }

    fn mark_approved(&mut self, reviewer: Reviewer, now: DateTime<Utc>) {
        self.status = VerificationStatus::Approved;
        self.rejection_reason = None;
        self.activation_token = None;
        self.token_expiry = None;
        self.verified_by = Some(reviewer);
        self.verified_at = Some(now);
        self.updated_at = now;
    }
}
