//! Host verification handlers

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use validator::Validate;

use core_kernel::UserId;
use domain_verification::{DocumentKind, NewDocument};

use super::caller;
use crate::auth::{roles, Claims};
use crate::dto::verification::*;
use crate::{error::ApiError, AppState};

pub async fn status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<VerificationResponse>, ApiError> {
    let me = caller(&claims)?;
    Ok(Json(state.verification.status(me).await?.into()))
}

/// Starts (or restarts) verification; the activation link goes out by email
pub async fn request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<VerificationResponse>, ApiError> {
    let me = caller(&claims)?;
    Ok(Json(state.verification.request(me).await?.into()))
}

/// Target of the emailed activation link
pub async fn activate(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<VerificationResponse>, ApiError> {
    Ok(Json(state.verification.activate_by_token(&token).await?.into()))
}

pub async fn submit_documents(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<SubmitDocumentsRequest>,
) -> Result<Json<VerificationResponse>, ApiError> {
    request.validate()?;
    let me = caller(&claims)?;

    let uploads = request
        .documents
        .into_iter()
        .map(|d| -> Result<NewDocument, ApiError> {
            Ok(NewDocument {
                kind: d.kind.parse::<DocumentKind>()?,
                storage_key: d.storage_key,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(state.verification.submit_documents(me, uploads).await?.into()))
}

pub async fn list_documents(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<DocumentResponse>>, ApiError> {
    let me = caller(&claims)?;
    let documents = state.verification.documents(me).await?;
    Ok(Json(documents.into_iter().map(DocumentResponse::from).collect()))
}

/// Records the host's connected payout account
pub async fn link_payout_account(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<PayoutAccountRequest>,
) -> Result<Json<VerificationResponse>, ApiError> {
    request.validate()?;
    let me = caller(&claims)?;
    let record = state
        .verification
        .link_payout_account(me, request.account_id.trim())
        .await?;
    Ok(Json(record.into()))
}

pub async fn approve(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<ApproveRequest>,
) -> Result<Json<VerificationResponse>, ApiError> {
    claims.require(roles::ADMIN)?;
    let admin = caller(&claims)?;
    let record = state
        .verification
        .approve(UserId::from_uuid(request.user_id), admin)
        .await?;
    Ok(Json(record.into()))
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<VerificationResponse>, ApiError> {
    claims.require(roles::ADMIN)?;
    request.validate()?;
    let admin = caller(&claims)?;
    let record = state
        .verification
        .reject(UserId::from_uuid(request.user_id), admin, &request.reason)
        .await?;
    Ok(Json(record.into()))
}
