//! Invoice handlers

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

use core_kernel::InvoiceId;

use super::caller;
use crate::auth::Claims;
use crate::dto::invoice::InvoiceResponse;
use crate::{error::ApiError, AppState};

/// Invoices where the caller is the guest or the host
pub async fn list_invoices(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<InvoiceResponse>>, ApiError> {
    let me = caller(&claims)?;
    let invoices = state.invoices.list_for_user(me).await?;
    Ok(Json(invoices.into_iter().map(InvoiceResponse::from).collect()))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    let me = caller(&claims)?;
    Ok(Json(state.invoices.get(InvoiceId::from_uuid(id), me).await?.into()))
}

/// Counts a download; rendering the document happens elsewhere
pub async fn download_invoice(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    let me = caller(&claims)?;
    Ok(Json(state.invoices.record_download(InvoiceId::from_uuid(id), me).await?.into()))
}
