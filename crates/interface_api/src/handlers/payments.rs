//! Payment handlers

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Extension, Json,
};
use tracing::warn;

use core_kernel::BookingId;

use super::caller;
use crate::auth::Claims;
use crate::dto::payment::*;
use crate::{error::ApiError, AppState};

/// Header carrying `t=<unix>,v1=<hex hmac>`
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Creates (or returns the open) payment intent for the caller's booking
pub async fn create_intent(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<IntentRequest>,
) -> Result<Json<IntentResponse>, ApiError> {
    let me = caller(&claims)?;
    let handle = state
        .payments
        .create_intent(BookingId::from_uuid(request.booking_id), me)
        .await?;
    Ok(Json(handle.into()))
}

pub async fn intent_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(intent_id): Path<String>,
) -> Result<Json<IntentStatusResponse>, ApiError> {
    let me = caller(&claims)?;
    let view = state.payments.get_status(&intent_id, me).await?;
    Ok(Json(view.into()))
}

/// Processor callback
///
/// Answers 200 once the event is applied or acknowledged, 400 when the
/// signature does not verify. Any other failure answers 5xx so the processor
/// redelivers.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|h| h.to_str().ok()) else {
        warn!("Webhook delivery without signature header");
        return Err(ApiError::BadRequest("missing signature header".to_string()));
    };

    let outcome = state.reconciler.handle(signature, &body).await?;
    Ok(Json(outcome.into()))
}
