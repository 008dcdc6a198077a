//! Processor webhooks
//!
//! The processor signs each delivery with a header of the form
//! `t=<unix seconds>,v1=<hex hmac>`. The MAC is HMAC-SHA256 over
//! `"<t>.<raw body>"`. Deliveries older than the tolerance are rejected to
//! stop replays; several `v1` entries may be present while a secret is being
//! rotated.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

use crate::error::BillingError;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing or malformed signature header")]
    MalformedHeader,

    #[error("timestamp outside tolerance")]
    Expired,

    #[error("no matching signature")]
    Mismatch,
}

/// Checks webhook signatures against the shared secret
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    fn mac(&self, timestamp: i64, body: &[u8]) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        mac
    }

    /// Builds a header for `body`; used by tests and local tooling
    pub fn sign(&self, body: &[u8], timestamp: i64) -> String {
        let digest = self.mac(timestamp, body).finalize().into_bytes();
        format!("t={},v1={}", timestamp, hex::encode(digest))
    }

    pub fn verify(&self, header: &str, body: &[u8], now: DateTime<Utc>) -> Result<(), SignatureError> {
        let mut timestamp = None;
        let mut candidates = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| SignatureError::MalformedHeader)?)
                }
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
        if candidates.is_empty() {
            return Err(SignatureError::MalformedHeader);
        }
        if (now.timestamp() - timestamp).abs() > self.tolerance_secs {
            return Err(SignatureError::Expired);
        }

        let matched = candidates.iter().any(|candidate| match hex::decode(candidate) {
            Ok(bytes) => self.mac(timestamp, body).verify_slice(&bytes).is_ok(),
            Err(_) => false,
        });
        if matched {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

/// The part of an event the reconciler acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    IntentSucceeded { intent_id: String },
    IntentFailed { intent_id: String, reason: Option<String> },
    AccountUpdated { account_id: String, payouts_enabled: bool, charges_enabled: bool },
    /// Acknowledged and recorded, nothing else
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub kind: EventKind,
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawData,
}

#[derive(Deserialize)]
struct RawData {
    object: serde_json::Value,
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> Result<Self, BillingError> {
        let raw: RawEvent =
            serde_json::from_slice(body).map_err(|e| BillingError::MalformedEvent(e.to_string()))?;
        let object = &raw.data.object;
        let object_id = || {
            object
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| BillingError::MalformedEvent(format!("{} without data.object.id", raw.event_type)))
        };

        let kind = match raw.event_type.as_str() {
            "payment_intent.succeeded" => EventKind::IntentSucceeded { intent_id: object_id()? },
            "payment_intent.payment_failed" => EventKind::IntentFailed {
                intent_id: object_id()?,
                reason: object
                    .pointer("/last_payment_error/message")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            },
            "account.updated" => EventKind::AccountUpdated {
                account_id: object_id()?,
                payouts_enabled: object.get("payouts_enabled").and_then(|v| v.as_bool()).unwrap_or(false),
                charges_enabled: object.get("charges_enabled").and_then(|v| v.as_bool()).unwrap_or(false),
            },
            _ => EventKind::Unknown,
        };

        Ok(WebhookEvent {
            id: raw.id,
            event_type: raw.event_type,
            kind,
        })
    }
}
