//! Verification documents
//!
//! Only the storage key is kept here; the file itself lives in external
//! object storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{DocumentId, UserId};

use crate::error::VerificationError;
use crate::verification::Reviewer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Identity,
    Qualification,
    Other,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Identity => "identity",
            DocumentKind::Qualification => "qualification",
            DocumentKind::Other => "other",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = VerificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identity" => Ok(DocumentKind::Identity),
            "qualification" => Ok(DocumentKind::Qualification),
            "other" => Ok(DocumentKind::Other),
            other => Err(VerificationError::validation(format!("unknown document kind '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentDecision {
    Pending,
    Approved,
    Rejected,
}

impl DocumentDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentDecision::Pending => "pending",
            DocumentDecision::Approved => "approved",
            DocumentDecision::Rejected => "rejected",
        }
    }
}

impl FromStr for DocumentDecision {
    type Err = VerificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DocumentDecision::Pending),
            "approved" => Ok(DocumentDecision::Approved),
            "rejected" => Ok(DocumentDecision::Rejected),
            other => Err(VerificationError::validation(format!("unknown document decision '{}'", other))),
        }
    }
}

/// An upload reported by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    pub kind: DocumentKind,
    pub storage_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationDocument {
    pub id: DocumentId,
    pub user_id: UserId,
    pub kind: DocumentKind,
    pub storage_key: String,
    pub decision: DocumentDecision,
    pub reviewed_by: Option<Reviewer>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub submitted_at: DateTime<Utc>,
}

impl VerificationDocument {
    pub fn new(user_id: UserId, upload: NewDocument, now: DateTime<Utc>) -> Result<Self, VerificationError> {
        let storage_key = upload.storage_key.trim();
        if storage_key.is_empty() {
            return Err(VerificationError::validation("document storage key is required"));
        }
        Ok(Self {
            id: DocumentId::new(),
            user_id,
            kind: upload.kind,
            storage_key: storage_key.to_string(),
            decision: DocumentDecision::Pending,
            reviewed_by: None,
            reviewed_at: None,
            submitted_at: now,
        })
    }

    pub fn stamp(&mut self, decision: DocumentDecision, reviewer: Reviewer, at: DateTime<Utc>) {
        self.decision = decision;
        self.reviewed_by = Some(reviewer);
        self.reviewed_at = Some(at);
    }
}
