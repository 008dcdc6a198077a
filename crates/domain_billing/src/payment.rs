//! Payment records
//!
//! One payment per booking. The row is created `pending` when the intent is
//! created and only the webhook moves it to `succeeded` or `failed`. A failed
//! payment can be re-armed with a fresh intent when the guest retries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{BookingId, Money, PaymentId};

use crate::commission::Settlement;
use crate::error::BillingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(BillingError::validation(format!("unknown payment status '{}'", other))),
        }
    }
}

/// Destination charge: the platform keeps `application_fee`, the rest is
/// transferred to the host's connected account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeSplit {
    pub destination_account: String,
    pub application_fee: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    pub booking_id: BookingId,
    pub processor_intent_id: String,
    /// Gross amount charged to the guest
    pub amount: Money,
    pub commission: Money,
    pub vat: Money,
    pub host_amount: Money,
    pub fee_split: Option<FeeSplit>,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    /// Intents created for this payment so far
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// A pending payment for a freshly created intent
    pub fn pending(
        id: PaymentId,
        booking_id: BookingId,
        intent_id: impl Into<String>,
        settlement: &Settlement,
        fee_split: Option<FeeSplit>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            booking_id,
            processor_intent_id: intent_id.into(),
            amount: settlement.gross,
            commission: settlement.commission,
            vat: settlement.vat,
            host_amount: settlement.host_amount,
            fee_split,
            status: PaymentStatus::Pending,
            failure_reason: None,
            attempts: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn settlement(&self) -> Settlement {
        Settlement {
            gross: self.amount,
            commission: self.commission,
            vat: self.vat,
            host_amount: self.host_amount,
        }
    }

    /// Idempotency key for the processor call creating attempt `attempt`
    pub fn idempotency_key(id: PaymentId, attempt: u32) -> String {
        format!("{}-{}", id.as_uuid().simple(), attempt)
    }
}
