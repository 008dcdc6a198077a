//! Stripe-compatible payment intent client

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use core_kernel::{Currency, Money};
use domain_billing::{CreateIntentRequest, IntentStatus, PaymentProcessor, ProcessorError, ProcessorIntent};

/// Connection settings for the processor API
#[derive(Clone)]
pub struct StripeConfig {
    /// e.g. `https://api.stripe.com`
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl StripeConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct IntentBody {
    id: String,
    client_secret: Option<String>,
    status: String,
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

/// HTTP implementation of [`PaymentProcessor`]
#[derive(Debug, Clone)]
pub struct StripeProcessor {
    config: StripeConfig,
    client: Client,
}

impl StripeProcessor {
    pub fn new(config: StripeConfig) -> Result<Self, ProcessorError> {
        if config.api_key.trim().is_empty() {
            return Err(ProcessorError::Configuration("processor API key is empty".into()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProcessorError::Configuration(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn read_intent(response: Response) -> Result<ProcessorIntent, ProcessorError> {
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(classify_failure(status, &text));
        }
        let body: IntentBody =
            serde_json::from_str(&text).map_err(|e| ProcessorError::InvalidResponse(e.to_string()))?;
        intent_from_body(body)
    }
}

/// Form fields for `POST /v1/payment_intents`
pub(crate) fn intent_form(request: &CreateIntentRequest) -> Result<Vec<(String, String)>, ProcessorError> {
    let minor = |money: &Money| {
        money
            .to_minor_units()
            .map_err(|e| ProcessorError::Configuration(format!("amount not representable: {}", e)))
    };

    let mut form = vec![
        ("amount".to_string(), minor(&request.amount)?.to_string()),
        (
            "currency".to_string(),
            request.amount.currency().code().to_ascii_lowercase(),
        ),
        ("automatic_payment_methods[enabled]".to_string(), "true".to_string()),
        ("metadata[booking_id]".to_string(), request.booking_id.as_uuid().to_string()),
        ("metadata[payment_id]".to_string(), request.payment_id.as_uuid().to_string()),
    ];
    if let Some(transfer) = &request.transfer {
        form.push(("transfer_data[destination]".to_string(), transfer.destination.clone()));
        form.push((
            "application_fee_amount".to_string(),
            minor(&transfer.application_fee)?.to_string(),
        ));
    }
    Ok(form)
}

fn intent_from_body(body: IntentBody) -> Result<ProcessorIntent, ProcessorError> {
    let currency: Currency = body
        .currency
        .parse()
        .map_err(|_| ProcessorError::InvalidResponse(format!("unknown currency '{}'", body.currency)))?;
    let client_secret = body
        .client_secret
        .ok_or_else(|| ProcessorError::InvalidResponse(format!("intent {} has no client secret", body.id)))?;
    Ok(ProcessorIntent {
        status: IntentStatus::parse(&body.status)?,
        amount: Money::from_minor(body.amount, currency),
        id: body.id,
        client_secret,
    })
}

/// Maps a non-2xx response to a processor error
fn classify_failure(status: StatusCode, body: &str) -> ProcessorError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return ProcessorError::Unavailable(format!("processor returned {}", status));
    }
    if status == StatusCode::UNAUTHORIZED {
        return ProcessorError::Configuration("processor rejected the API key".into());
    }
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => ProcessorError::Rejected {
            code: error
                .code
                .or(error.kind)
                .unwrap_or_else(|| status.as_u16().to_string()),
            message: error.message.unwrap_or_default(),
        },
        Err(_) => ProcessorError::InvalidResponse(format!("processor returned {} with an unreadable body", status)),
    }
}

fn transport_error(error: reqwest::Error) -> ProcessorError {
    if error.is_timeout() {
        ProcessorError::Unavailable("request timed out".into())
    } else if error.is_connect() {
        ProcessorError::Unavailable(format!("connection failed: {}", error))
    } else {
        ProcessorError::Unavailable(error.to_string())
    }
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    #[instrument(skip(self, request), fields(payment_id = %request.payment_id, amount = %request.amount))]
    async fn create_intent(&self, request: CreateIntentRequest) -> Result<ProcessorIntent, ProcessorError> {
        let form = intent_form(&request)?;
        debug!(fields = form.len(), "Creating payment intent");

        let response = self
            .client
            .post(self.url("/v1/payment_intents"))
            .bearer_auth(&self.config.api_key)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&form)
            .send()
            .await
            .map_err(transport_error)?;

        let result = Self::read_intent(response).await;
        if let Err(e) = &result {
            warn!(error = %e, "Payment intent creation failed");
        }
        result
    }

    #[instrument(skip(self))]
    async fn retrieve_intent(&self, intent_id: &str) -> Result<ProcessorIntent, ProcessorError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/payment_intents/{}", intent_id)))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(transport_error)?;
        Self::read_intent(response).await
    }

    #[instrument(skip(self))]
    async fn cancel_intent(&self, intent_id: &str) -> Result<ProcessorIntent, ProcessorError> {
        let response = self
            .client
            .post(self.url(&format!("/v1/payment_intents/{}/cancel", intent_id)))
            .bearer_auth(&self.config.api_key)
            .form(&[("cancellation_reason", "abandoned")])
            .send()
            .await
            .map_err(transport_error)?;

        let result = Self::read_intent(response).await;
        if let Err(e) = &result {
            warn!(error = %e, "Payment intent cancellation failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{BookingId, PaymentId};
    use domain_billing::Transfer;
    use rust_decimal_macros::dec;

    fn request(transfer: Option<Transfer>) -> CreateIntentRequest {
        CreateIntentRequest {
            amount: Money::new(dec!(135.00), Currency::EUR),
            idempotency_key: "k-1".into(),
            booking_id: BookingId::new(),
            payment_id: PaymentId::new(),
            transfer,
        }
    }

    fn field<'a>(form: &'a [(String, String)], name: &str) -> Option<&'a str> {
        form.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_form_uses_minor_units_and_lowercase_currency() {
        let form = intent_form(&request(None)).unwrap();
        assert_eq!(field(&form, "amount"), Some("13500"));
        assert_eq!(field(&form, "currency"), Some("eur"));
        assert_eq!(field(&form, "transfer_data[destination]"), None);
    }

    #[test]
    fn test_form_carries_destination_charge() {
        let form = intent_form(&request(Some(Transfer {
            destination: "acct_9".into(),
            application_fee: Money::new(dec!(16.34), Currency::EUR),
        })))
        .unwrap();
        assert_eq!(field(&form, "transfer_data[destination]"), Some("acct_9"));
        assert_eq!(field(&form, "application_fee_amount"), Some("1634"));
    }

    #[test]
    fn test_card_error_is_rejection() {
        let body = r#"{"error":{"type":"card_error","code":"card_declined","message":"Your card was declined."}}"#;
        assert_eq!(
            classify_failure(StatusCode::PAYMENT_REQUIRED, body),
            ProcessorError::Rejected {
                code: "card_declined".into(),
                message: "Your card was declined.".into()
            }
        );
    }

    #[test]
    fn test_server_errors_are_retryable() {
        assert!(classify_failure(StatusCode::BAD_GATEWAY, "").is_retryable());
        assert!(classify_failure(StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
        assert!(matches!(
            classify_failure(StatusCode::UNAUTHORIZED, "{}"),
            ProcessorError::Configuration(_)
        ));
    }

    #[test]
    fn test_intent_body_mapping() {
        let body: IntentBody = serde_json::from_str(
            r#"{"id":"pi_1","client_secret":"pi_1_secret_x","status":"requires_payment_method","amount":5000,"currency":"eur"}"#,
        )
        .unwrap();
        let intent = intent_from_body(body).unwrap();
        assert_eq!(intent.amount, Money::new(dec!(50.00), Currency::EUR));
        assert_eq!(intent.status, IntentStatus::RequiresPaymentMethod);
    }

    #[test]
    fn test_empty_key_is_configuration_error() {
        let err = StripeProcessor::new(StripeConfig::new("https://api.example.com", " ")).unwrap_err();
        assert!(matches!(err, ProcessorError::Configuration(_)));
    }
}
