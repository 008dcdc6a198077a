//! Pricing Domain Ports
//!
//! `TariffPort` is the storage boundary for tariffs. Each method is one
//! atomic operation in the adapter:
//!
//! - **PostgreSQL** (infra_db): per-host advisory transaction lock plus
//!   `INSERT ... ON CONFLICT (host_id, duration_minutes)`
//! - **In-memory** (infra_db): one critical section over a [`HostSchedule`]
//!
//! Reads (`list_tariffs`, `get_tariff`, `hosts_in_price_range`) take no
//! lock of their own. In PostgreSQL they are plain snapshot reads that never
//! wait on the advisory lock; the in-memory store serves them under the
//! shared half of its `RwLock`, so they queue only behind a write in progress.
//!
//! [`HostSchedule`]: crate::schedule::HostSchedule

use async_trait::async_trait;

use core_kernel::{Currency, DomainPort, Money, PortError, TariffId, UserId};

use crate::tariff::{Tariff, TariffFields};

/// Insert-or-update request keyed on (host, duration)
#[derive(Debug, Clone)]
pub struct UpsertTariff {
    pub host_id: UserId,
    pub duration_minutes: u32,
    pub fields: TariffFields,
    /// Active-tariff cap enforced inside the same atomic step
    pub max_active: usize,
}

/// Result of an upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(Tariff),
    Updated(Tariff),
    /// The write would activate a duration while `active` tariffs are
    /// already active; nothing was written
    LimitReached { active: usize },
}

/// Result of a delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// No tariff with that id belongs to the host
    NotFound,
    /// A booking that was not cancelled still references the tariff
    Referenced,
}

/// Inclusive price bounds for host discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceRange {
    pub min: Money,
    pub max: Money,
}

impl PriceRange {
    pub fn new(min: Money, max: Money) -> Result<Self, PortError> {
        if min.currency() != max.currency() {
            return Err(PortError::validation("price range bounds must share a currency"));
        }
        if min.amount() > max.amount() {
            return Err(PortError::validation("min must not exceed max"));
        }
        Ok(Self { min, max })
    }

    pub fn currency(&self) -> Currency {
        self.min.currency()
    }

    pub fn contains(&self, price: &Money) -> bool {
        price.currency() == self.currency()
            && price.amount() >= self.min.amount()
            && price.amount() <= self.max.amount()
    }
}

#[async_trait]
pub trait TariffPort: DomainPort {
    /// Inserts or updates a tariff, applying the active cap atomically
    async fn upsert_tariff(&self, request: UpsertTariff) -> Result<UpsertOutcome, PortError>;

    /// Clears every primary flag of the host and sets it on `tariff_id`, in
    /// one transaction
    ///
    /// # Errors
    ///
    /// - `PortError::NotFound` when the tariff does not belong to the host
    /// - `PortError::Conflict` when the tariff is inactive
    async fn set_primary(&self, tariff_id: TariffId, host_id: UserId) -> Result<Tariff, PortError>;

    /// Deletes a tariff unless a non-cancelled booking references it; the
    /// check and the delete are one statement
    async fn delete_tariff(&self, tariff_id: TariffId, host_id: UserId) -> Result<DeleteOutcome, PortError>;

    async fn get_tariff(&self, tariff_id: TariffId) -> Result<Option<Tariff>, PortError>;

    /// All of a host's tariffs, active or not, ordered by duration ascending
    async fn list_tariffs(&self, host_id: UserId) -> Result<Vec<Tariff>, PortError>;

    /// Hosts with at least one active tariff priced inside `range`
    async fn hosts_in_price_range(&self, range: PriceRange) -> Result<Vec<UserId>, PortError>;
}

/// In-memory implementation of TariffPort for unit tests
///
/// One write lock over every host's schedule, so upserts and primary
/// switches are serialized the same way the database adapter serializes them.
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use chrono::Utc;

    use crate::schedule::HostSchedule;

    #[derive(Debug, Default)]
    pub struct MockTariffPort {
        schedules: Arc<RwLock<HashMap<UserId, HostSchedule>>>,
        referenced: Arc<RwLock<HashSet<TariffId>>>,
    }

    impl MockTariffPort {
        pub fn new() -> Self {
            Self::default()
        }

        /// Marks a tariff as used by an open booking
        pub async fn mark_referenced(&self, tariff_id: TariffId) {
            self.referenced.write().await.insert(tariff_id);
        }
    }

    impl DomainPort for MockTariffPort {}

    #[async_trait]
    impl TariffPort for MockTariffPort {
        async fn upsert_tariff(&self, request: UpsertTariff) -> Result<UpsertOutcome, PortError> {
            let mut schedules = self.schedules.write().await;
            let schedule = schedules
                .entry(request.host_id)
                .or_insert_with(|| HostSchedule::new(request.host_id));
            Ok(schedule.upsert(request.duration_minutes, request.fields, request.max_active, Utc::now()))
        }

        async fn set_primary(&self, tariff_id: TariffId, host_id: UserId) -> Result<Tariff, PortError> {
            let mut schedules = self.schedules.write().await;
            let schedule = schedules
                .get_mut(&host_id)
                .ok_or_else(|| PortError::not_found("Tariff", tariff_id))?;
            Ok(schedule.set_primary(tariff_id, Utc::now())?)
        }

        async fn delete_tariff(&self, tariff_id: TariffId, host_id: UserId) -> Result<DeleteOutcome, PortError> {
            let mut schedules = self.schedules.write().await;
            let Some(schedule) = schedules.get_mut(&host_id) else {
                return Ok(DeleteOutcome::NotFound);
            };
            if schedule.get(tariff_id).is_none() {
                return Ok(DeleteOutcome::NotFound);
            }
            if self.referenced.read().await.contains(&tariff_id) {
                return Ok(DeleteOutcome::Referenced);
            }
            schedule.remove(tariff_id);
            Ok(DeleteOutcome::Deleted)
        }

        async fn get_tariff(&self, tariff_id: TariffId) -> Result<Option<Tariff>, PortError> {
            let schedules = self.schedules.read().await;
            Ok(schedules.values().find_map(|s| s.get(tariff_id).cloned()))
        }

        async fn list_tariffs(&self, host_id: UserId) -> Result<Vec<Tariff>, PortError> {
            let schedules = self.schedules.read().await;
            Ok(schedules.get(&host_id).map(|s| s.tariffs()).unwrap_or_default())
        }

        async fn hosts_in_price_range(&self, range: PriceRange) -> Result<Vec<UserId>, PortError> {
            let schedules = self.schedules.read().await;
            let mut hosts: Vec<UserId> = schedules
                .values()
                .filter(|s| s.tariffs().iter().any(|t| t.is_active && range.contains(&t.price)))
                .map(|s| s.host_id())
                .collect();
            hosts.sort_by_key(|h| *h.as_uuid());
            Ok(hosts)
        }
    }
}
