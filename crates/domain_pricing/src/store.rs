//! Tariff store service
//!
//! Validates input, then delegates each operation to a single atomic
//! [`TariffPort`] call.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use core_kernel::{PortError, TariffId, UserId};

use crate::error::PricingError;
use crate::ports::{DeleteOutcome, PriceRange, TariffPort, UpsertOutcome, UpsertTariff};
use crate::tariff::{validate_duration, Tariff, TariffFields};

/// Active tariffs a host may publish unless configured otherwise
pub const DEFAULT_MAX_ACTIVE_TARIFFS: usize = 5;

/// Owns a host's bookable duration/price/add-on combinations
#[derive(Clone)]
pub struct TariffStore {
    port: Arc<dyn TariffPort>,
    max_active: usize,
}

impl TariffStore {
    pub fn new(port: Arc<dyn TariffPort>) -> Self {
        Self {
            port,
            max_active: DEFAULT_MAX_ACTIVE_TARIFFS,
        }
    }

    /// Overrides the active-tariff cap
    pub fn with_max_active(mut self, max_active: usize) -> Self {
        self.max_active = max_active;
        self
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    /// Inserts or updates the host's tariff for `duration_minutes`
    ///
    /// # Errors
    ///
    /// - `PricingError::Validation` for an out-of-range duration or price
    /// - `PricingError::TariffLimitExceeded` when the write would activate a
    ///   duration beyond the cap; the existing tariffs are left unchanged
    #[instrument(skip(self, fields), fields(host_id = %host_id))]
    pub async fn upsert(
        &self,
        host_id: UserId,
        duration_minutes: u32,
        fields: TariffFields,
    ) -> Result<Tariff, PricingError> {
        validate_duration(duration_minutes)?;
        fields.validate()?;

        let request = UpsertTariff {
            host_id,
            duration_minutes,
            fields,
            max_active: self.max_active,
        };

        match self.port.upsert_tariff(request).await? {
            UpsertOutcome::Created(tariff) => {
                info!(tariff_id = %tariff.id, duration_minutes, "Tariff created");
                Ok(tariff)
            }
            UpsertOutcome::Updated(tariff) => {
                info!(tariff_id = %tariff.id, duration_minutes, active = tariff.is_active, "Tariff updated");
                Ok(tariff)
            }
            UpsertOutcome::LimitReached { active } => {
                warn!(active, limit = self.max_active, "Active tariff cap reached");
                Err(PricingError::TariffLimitExceeded {
                    host_id: host_id.to_string(),
                    limit: self.max_active,
                })
            }
        }
    }

    /// Makes `tariff_id` the host's only primary tariff
    #[instrument(skip(self), fields(tariff_id = %tariff_id, host_id = %host_id))]
    pub async fn set_primary(&self, tariff_id: TariffId, host_id: UserId) -> Result<Tariff, PricingError> {
        let tariff = self
            .port
            .set_primary(tariff_id, host_id)
            .await
            .map_err(|err| match err {
                PortError::Conflict { .. } => PricingError::TariffInactive(tariff_id.to_string()),
                PortError::NotFound { .. } => PricingError::TariffNotFound(tariff_id.to_string()),
                other => PricingError::from(other),
            })?;
        info!("Primary tariff switched");
        Ok(tariff)
    }

    /// Deletes a tariff not referenced by any open booking
    #[instrument(skip(self), fields(tariff_id = %tariff_id, host_id = %host_id))]
    pub async fn delete(&self, tariff_id: TariffId, host_id: UserId) -> Result<(), PricingError> {
        match self.port.delete_tariff(tariff_id, host_id).await? {
            DeleteOutcome::Deleted => {
                info!("Tariff deleted");
                Ok(())
            }
            DeleteOutcome::NotFound => Err(PricingError::TariffNotFound(tariff_id.to_string())),
            DeleteOutcome::Referenced => Err(PricingError::TariffInUse(tariff_id.to_string())),
        }
    }

    /// Returns the tariff, or `TariffNotFound`
    pub async fn get(&self, tariff_id: TariffId) -> Result<Tariff, PricingError> {
        self.port
            .get_tariff(tariff_id)
            .await?
            .ok_or_else(|| PricingError::TariffNotFound(tariff_id.to_string()))
    }

    /// All of a host's tariffs ordered by duration ascending
    pub async fn list(&self, host_id: UserId) -> Result<Vec<Tariff>, PricingError> {
        Ok(self.port.list_tariffs(host_id).await?)
    }

    /// Hosts offering at least one active tariff inside `range`
    pub async fn hosts_in_price_range(&self, range: PriceRange) -> Result<Vec<UserId>, PricingError> {
        Ok(self.port.hosts_in_price_range(range).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mock::MockTariffPort;
    use crate::tariff::AddonFlags;
    use core_kernel::{Currency, Money};
    use rust_decimal_macros::dec;

    fn store() -> (TariffStore, Arc<MockTariffPort>) {
        let port = Arc::new(MockTariffPort::new());
        (TariffStore::new(port.clone()), port)
    }

    fn fields(amount: rust_decimal::Decimal) -> TariffFields {
        TariffFields::active(Money::new(amount, Currency::EUR), AddonFlags::none())
    }

    #[tokio::test]
    async fn test_tariff_cap_scenario() {
        let (store, _) = store();
        let host = UserId::new();
        for d in [30, 60, 90, 120, 150] {
            store.upsert(host, d, fields(dec!(50.00))).await.unwrap();
        }

        let err = store.upsert(host, 180, fields(dec!(50.00))).await.unwrap_err();

        assert!(matches!(err, PricingError::TariffLimitExceeded { limit: 5, .. }));
        let listed = store.list(host).await.unwrap();
        assert_eq!(listed.len(), 5);
        assert!(listed.iter().all(|t| t.is_active));
    }

    #[tokio::test]
    async fn test_configured_cap() {
        let (store, _) = store();
        let store = store.with_max_active(2);
        let host = UserId::new();
        store.upsert(host, 30, fields(dec!(20.00))).await.unwrap();
        store.upsert(host, 60, fields(dec!(35.00))).await.unwrap();

        assert!(store.upsert(host, 90, fields(dec!(50.00))).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_primary_switch_scenario() {
        let (store, _) = store();
        let host = UserId::new();
        let sixty = store.upsert(host, 60, fields(dec!(80.00))).await.unwrap();
        let ninety = store.upsert(host, 90, fields(dec!(110.00))).await.unwrap();

        store.set_primary(sixty.id, host).await.unwrap();
        store.set_primary(ninety.id, host).await.unwrap();

        let primaries: Vec<_> = store.list(host).await.unwrap().into_iter().filter(|t| t.is_primary).collect();
        assert_eq!(primaries.len(), 1);
        assert_eq!(primaries[0].id, ninety.id);
    }

    #[tokio::test]
    async fn test_set_primary_of_foreign_tariff_is_not_found() {
        let (store, _) = store();
        let owner = UserId::new();
        let tariff = store.upsert(owner, 60, fields(dec!(80.00))).await.unwrap();
        store.upsert(UserId::new(), 60, fields(dec!(80.00))).await.unwrap();

        let stranger = UserId::new();
        assert!(matches!(
            store.set_primary(tariff.id, stranger).await,
            Err(PricingError::TariffNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_referenced_tariff_conflicts() {
        let (store, port) = store();
        let host = UserId::new();
        let tariff = store.upsert(host, 60, fields(dec!(80.00))).await.unwrap();
        port.mark_referenced(tariff.id).await;

        assert!(matches!(store.delete(tariff.id, host).await, Err(PricingError::TariffInUse(_))));
        assert!(store.get(tariff.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_unreferenced_tariff() {
        let (store, _) = store();
        let host = UserId::new();
        let tariff = store.upsert(host, 60, fields(dec!(80.00))).await.unwrap();

        store.delete(tariff.id, host).await.unwrap();

        assert!(matches!(store.get(tariff.id).await, Err(PricingError::TariffNotFound(_))));
        assert!(matches!(store.delete(tariff.id, host).await, Err(PricingError::TariffNotFound(_))));
    }

    #[tokio::test]
    async fn test_invalid_input_rejected_before_storage() {
        let (store, _) = store();
        let host = UserId::new();

        assert!(matches!(store.upsert(host, 0, fields(dec!(10.00))).await, Err(PricingError::Validation(_))));
        assert!(matches!(store.upsert(host, 60, fields(dec!(10.005))).await, Err(PricingError::Validation(_))));
        assert!(store.list(host).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hosts_in_price_range_ignores_inactive_tariffs() {
        let (store, _) = store();
        let cheap = UserId::new();
        let pricey = UserId::new();
        let dormant = UserId::new();
        store.upsert(cheap, 30, fields(dec!(25.00))).await.unwrap();
        store.upsert(pricey, 60, fields(dec!(300.00))).await.unwrap();
        store.upsert(dormant, 60, fields(dec!(30.00)).deactivated()).await.unwrap();

        let range = PriceRange::new(
            Money::new(dec!(20.00), Currency::EUR),
            Money::new(dec!(50.00), Currency::EUR),
        )
        .unwrap();

        assert_eq!(store.hosts_in_price_range(range).await.unwrap(), vec![cheap]);
    }
}
