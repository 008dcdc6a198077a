//! Payment processor boundary
//!
//! The platform never touches card data. It asks the processor for a payment
//! intent, hands the client secret to the browser and learns the outcome from
//! a signed webhook. [`PaymentProcessor`] is the outbound half of that
//! exchange; the HTTP implementation lives in `infra_payments`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use core_kernel::{BookingId, Money, PaymentId};

/// Errors reported by the processor boundary
///
/// None of these are shown to clients verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProcessorError {
    /// The processor refused the request (card declined, invalid account)
    #[error("Rejected by processor ({code}): {message}")]
    Rejected { code: String, message: String },

    /// Network failure, timeout or 5xx
    #[error("Processor unavailable: {0}")]
    Unavailable(String),

    #[error("Unexpected processor response: {0}")]
    InvalidResponse(String),

    #[error("Processor misconfigured: {0}")]
    Configuration(String),
}

impl ProcessorError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProcessorError::Unavailable(_))
    }
}

/// Destination of a destination charge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Host's connected account
    pub destination: String,
    /// Kept by the platform
    pub application_fee: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIntentRequest {
    pub amount: Money,
    /// Same key, same intent; the processor deduplicates on it
    pub idempotency_key: String,
    pub booking_id: BookingId,
    pub payment_id: PaymentId,
    pub transfer: Option<Transfer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    Succeeded,
    Canceled,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::RequiresPaymentMethod => "requires_payment_method",
            IntentStatus::RequiresConfirmation => "requires_confirmation",
            IntentStatus::RequiresAction => "requires_action",
            IntentStatus::Processing => "processing",
            IntentStatus::Succeeded => "succeeded",
            IntentStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ProcessorError> {
        match s {
            "requires_payment_method" => Ok(IntentStatus::RequiresPaymentMethod),
            "requires_confirmation" => Ok(IntentStatus::RequiresConfirmation),
            "requires_action" => Ok(IntentStatus::RequiresAction),
            "processing" => Ok(IntentStatus::Processing),
            "succeeded" => Ok(IntentStatus::Succeeded),
            "canceled" => Ok(IntentStatus::Canceled),
            other => Err(ProcessorError::InvalidResponse(format!("unknown intent status '{}'", other))),
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorIntent {
    pub id: String,
    pub client_secret: String,
    pub status: IntentStatus,
    pub amount: Money,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_intent(&self, request: CreateIntentRequest) -> Result<ProcessorIntent, ProcessorError>;

    async fn retrieve_intent(&self, intent_id: &str) -> Result<ProcessorIntent, ProcessorError>;

    /// Cancels an intent so its client secret can no longer be charged.
    /// Fails with `Rejected` once the intent has succeeded.
    async fn cancel_intent(&self, intent_id: &str) -> Result<ProcessorIntent, ProcessorError>;
}

#[cfg(any(test, feature = "mock"))]
pub mod mock {
    //! In-process processor that hands out `pi_N` intents

    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct State {
        intents: HashMap<String, ProcessorIntent>,
        by_key: HashMap<String, String>,
        requests: Vec<CreateIntentRequest>,
        fail_next: Option<ProcessorError>,
    }

    /// Deduplicates on the idempotency key like the real processor
    #[derive(Clone, Default)]
    pub struct FakeProcessor {
        state: Arc<Mutex<State>>,
    }

    impl FakeProcessor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every create request received, duplicates included
        pub fn requests(&self) -> Vec<CreateIntentRequest> {
            self.lock().requests.clone()
        }

        pub fn intent_count(&self) -> usize {
            self.lock().intents.len()
        }

        /// Makes the next call fail with `error`
        pub fn fail_next(&self, error: ProcessorError) {
            self.lock().fail_next = Some(error);
        }

        pub fn set_status(&self, intent_id: &str, status: IntentStatus) {
            if let Some(intent) = self.lock().intents.get_mut(intent_id) {
                intent.status = status;
            }
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, State> {
            self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }
    }

    #[async_trait]
    impl PaymentProcessor for FakeProcessor {
        async fn create_intent(&self, request: CreateIntentRequest) -> Result<ProcessorIntent, ProcessorError> {
            let mut state = self.lock();
            if let Some(error) = state.fail_next.take() {
                return Err(error);
            }
            state.requests.push(request.clone());

            if let Some(existing) = state.by_key.get(&request.idempotency_key) {
                if let Some(intent) = state.intents.get(existing) {
                    return Ok(intent.clone());
                }
            }

            let id = format!("pi_{}", state.intents.len() + 1);
            let intent = ProcessorIntent {
                id: id.clone(),
                client_secret: format!("{}_secret_{}", id, request.payment_id.as_uuid().simple()),
                status: IntentStatus::RequiresPaymentMethod,
                amount: request.amount,
            };
            state.by_key.insert(request.idempotency_key.clone(), id.clone());
            state.intents.insert(id, intent.clone());
            Ok(intent)
        }

        async fn retrieve_intent(&self, intent_id: &str) -> Result<ProcessorIntent, ProcessorError> {
            let mut state = self.lock();
            if let Some(error) = state.fail_next.take() {
                return Err(error);
            }
            state.intents.get(intent_id).cloned().ok_or_else(|| missing(intent_id))
        }

        async fn cancel_intent(&self, intent_id: &str) -> Result<ProcessorIntent, ProcessorError> {
            let mut state = self.lock();
            if let Some(error) = state.fail_next.take() {
                return Err(error);
            }
            let intent = state.intents.get_mut(intent_id).ok_or_else(|| missing(intent_id))?;
            if matches!(intent.status, IntentStatus::Succeeded | IntentStatus::Canceled) {
                return Err(ProcessorError::Rejected {
                    code: "payment_intent_unexpected_state".to_string(),
                    message: format!("payment_intent {} is {}", intent_id, intent.status),
                });
            }
            intent.status = IntentStatus::Canceled;
            Ok(intent.clone())
        }
    }

    fn missing(intent_id: &str) -> ProcessorError {
        ProcessorError::Rejected {
            code: "resource_missing".to_string(),
            message: format!("No such payment_intent: {}", intent_id),
        }
    }
}
