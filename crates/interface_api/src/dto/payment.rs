//! Payment DTOs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use domain_billing::{IntentHandle, IntentStatusView, ReconcileOutcome};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRequest {
    pub booking_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResponse {
    pub client_secret: String,
    pub intent_id: String,
    pub payment_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
}

impl From<IntentHandle> for IntentResponse {
    fn from(handle: IntentHandle) -> Self {
        Self {
            client_secret: handle.client_secret,
            intent_id: handle.intent_id,
            payment_id: handle.payment_id.into_uuid(),
            amount: handle.amount.amount(),
            currency: handle.amount.currency().code().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentStatusResponse {
    pub intent_id: String,
    pub payment_id: Uuid,
    pub booking_id: Uuid,
    pub payment_status: String,
    pub processor_status: Option<String>,
}

impl From<IntentStatusView> for IntentStatusResponse {
    fn from(view: IntentStatusView) -> Self {
        Self {
            intent_id: view.intent_id,
            payment_id: view.payment_id.into_uuid(),
            booking_id: view.booking_id.into_uuid(),
            payment_status: view.payment_status.as_str().to_string(),
            processor_status: view.processor_status.map(|s| s.as_str().to_string()),
        }
    }
}

/// Acknowledgement returned to the processor
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
    pub event_id: String,
    pub outcome: &'static str,
}

impl From<ReconcileOutcome> for WebhookAck {
    fn from(outcome: ReconcileOutcome) -> Self {
        let (event_id, label) = match outcome {
            ReconcileOutcome::Processed { event_id, .. } => (event_id, "processed"),
            ReconcileOutcome::Duplicate { event_id } => (event_id, "duplicate"),
            ReconcileOutcome::Ignored { event_id, .. } => (event_id, "ignored"),
        };
        Self {
            received: true,
            event_id,
            outcome: label,
        }
    }
}
