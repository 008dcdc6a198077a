//! Pricing handlers

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use core_kernel::{Money, TariffId, UserId};
use domain_pricing::{PriceRange, PricingError, TariffFields};

use super::{acting_for, caller, currency};
use crate::auth::Claims;
use crate::dto::pricing::*;
use crate::{error::ApiError, AppState};

/// Inserts or updates the host's tariff for a duration
pub async fn upsert_tariff(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(request): Json<UpsertTariffRequest>,
) -> Result<Json<TariffResponse>, ApiError> {
    request.validate()?;
    let host_id = UserId::from_uuid(request.host_id);
    acting_for(&claims, host_id)?;

    let price = Money::new(request.price, currency(&state, request.currency.as_deref())?);
    let fields = TariffFields {
        price,
        is_active: request.is_active.unwrap_or(true),
        is_custom: request.is_custom.unwrap_or(false),
        addons: request.addon_flags,
    };

    let tariff = state.tariffs.upsert(host_id, request.duration_minutes, fields).await?;
    Ok(Json(tariff.into()))
}

/// Makes the tariff the host's only primary
pub async fn set_primary(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetPrimaryRequest>,
) -> Result<Json<TariffResponse>, ApiError> {
    let host_id = UserId::from_uuid(request.host_id);
    acting_for(&claims, host_id)?;

    let tariff = state.tariffs.set_primary(TariffId::from_uuid(id), host_id).await?;
    Ok(Json(tariff.into()))
}

pub async fn delete_tariff(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((id, host_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DeleteTariffResponse>, ApiError> {
    let host_id = UserId::from_uuid(host_id);
    acting_for(&claims, host_id)?;

    state.tariffs.delete(TariffId::from_uuid(id), host_id).await?;
    Ok(Json(DeleteTariffResponse { id, deleted: true }))
}

/// Lists a host's tariffs by duration
pub async fn list_tariffs(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(host_id): Path<Uuid>,
) -> Result<Json<Vec<TariffResponse>>, ApiError> {
    caller(&claims)?;
    let tariffs = state.tariffs.list(UserId::from_uuid(host_id)).await?;
    Ok(Json(tariffs.into_iter().map(TariffResponse::from).collect()))
}

/// Hosts with an active tariff priced within `[min, max]`
pub async fn search_hosts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<PriceSearchQuery>,
) -> Result<Json<HostSearchResponse>, ApiError> {
    caller(&claims)?;
    let currency = currency(&state, query.currency.as_deref())?;
    let range = PriceRange::new(Money::new(query.min, currency), Money::new(query.max, currency))
        .map_err(PricingError::from)?;

    let hosts = state.tariffs.hosts_in_price_range(range).await?;
    Ok(Json(HostSearchResponse {
        host_ids: hosts.into_iter().map(UserId::into_uuid).collect(),
    }))
}
