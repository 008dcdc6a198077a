//! Pricing DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use domain_pricing::{AddonFlags, Tariff};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpsertTariffRequest {
    pub host_id: Uuid,
    #[validate(range(min = 1, max = 1440))]
    pub duration_minutes: u32,
    pub price: Decimal,
    /// Falls back to the configured currency
    pub currency: Option<String>,
    pub is_active: Option<bool>,
    pub is_custom: Option<bool>,
    #[serde(default)]
    pub addon_flags: AddonFlags,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPrimaryRequest {
    pub host_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct PriceSearchQuery {
    pub min: Decimal,
    pub max: Decimal,
    pub currency: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TariffResponse {
    pub id: Uuid,
    pub host_id: Uuid,
    pub duration_minutes: u32,
    pub price: Decimal,
    pub currency: String,
    pub is_active: bool,
    pub is_primary: bool,
    pub is_custom: bool,
    pub addon_flags: AddonFlags,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Tariff> for TariffResponse {
    fn from(tariff: Tariff) -> Self {
        Self {
            id: tariff.id.into_uuid(),
            host_id: tariff.host_id.into_uuid(),
            duration_minutes: tariff.duration_minutes,
            price: tariff.price.amount(),
            currency: tariff.price.currency().code().to_string(),
            is_active: tariff.is_active,
            is_primary: tariff.is_primary,
            is_custom: tariff.is_custom,
            addon_flags: tariff.addons,
            created_at: tariff.created_at,
            updated_at: tariff.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTariffResponse {
    pub id: Uuid,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostSearchResponse {
    pub host_ids: Vec<Uuid>,
}
