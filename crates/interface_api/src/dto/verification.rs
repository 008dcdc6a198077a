//! Host verification DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use domain_verification::{HostVerification, VerificationDocument};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUpload {
    /// `identity`, `qualification` or `other`
    pub kind: String,
    /// Key of the already uploaded object
    pub storage_key: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitDocumentsRequest {
    #[validate(length(min = 1, message = "at least one document is required"))]
    pub documents: Vec<DocumentUpload>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PayoutAccountRequest {
    #[validate(length(min = 1, max = 255))]
    pub account_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RejectRequest {
    pub user_id: Uuid,
    #[validate(length(min = 1, max = 1000))]
    pub reason: String,
}

/// Verification state as shown to the host; the token is never included
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResponse {
    pub user_id: Uuid,
    pub status: String,
    pub token_expiry: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub connected_account_id: Option<String>,
    pub payouts_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<HostVerification> for VerificationResponse {
    fn from(record: HostVerification) -> Self {
        Self {
            user_id: record.user_id.into_uuid(),
            status: record.status.as_str().to_string(),
            token_expiry: record.token_expiry,
            rejection_reason: record.rejection_reason,
            verified_by: record.verified_by.map(|r| r.to_storage()),
            verified_at: record.verified_at,
            connected_account_id: record.connected_account_id,
            payouts_enabled: record.payouts_enabled,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: Uuid,
    pub kind: String,
    pub storage_key: String,
    pub decision: String,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub submitted_at: DateTime<Utc>,
}

impl From<VerificationDocument> for DocumentResponse {
    fn from(document: VerificationDocument) -> Self {
        Self {
            id: document.id.into_uuid(),
            kind: document.kind.as_str().to_string(),
            storage_key: document.storage_key,
            decision: document.decision.as_str().to_string(),
            reviewed_at: document.reviewed_at,
            submitted_at: document.submitted_at,
        }
    }
}
