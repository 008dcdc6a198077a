//! Host schedule aggregate
//!
//! All tariffs of one host, with the cap and primary-flag rules applied in
//! memory. Storage adapters that serialize writers per host (a lock or a
//! transaction) can load a schedule, mutate it and write it back.

use chrono::{DateTime, Utc};

use core_kernel::{TariffId, UserId};

use crate::error::PricingError;
use crate::ports::UpsertOutcome;
use crate::tariff::{Tariff, TariffFields};

#[derive(Debug, Clone)]
pub struct HostSchedule {
    host_id: UserId,
    tariffs: Vec<Tariff>,
}

impl HostSchedule {
    pub fn new(host_id: UserId) -> Self {
        Self {
            host_id,
            tariffs: Vec::new(),
        }
    }

    /// Rebuilds a schedule from stored tariffs, ignoring other hosts' rows
    pub fn from_tariffs(host_id: UserId, tariffs: impl IntoIterator<Item = Tariff>) -> Self {
        Self {
            host_id,
            tariffs: tariffs.into_iter().filter(|t| t.host_id == host_id).collect(),
        }
    }

    pub fn host_id(&self) -> UserId {
        self.host_id
    }

    /// Tariffs ordered by duration ascending
    pub fn tariffs(&self) -> Vec<Tariff> {
        let mut sorted = self.tariffs.clone();
        sorted.sort_by_key(|t| t.duration_minutes);
        sorted
    }

    pub fn get(&self, tariff_id: TariffId) -> Option<&Tariff> {
        self.tariffs.iter().find(|t| t.id == tariff_id)
    }

    pub fn active_count(&self) -> usize {
        self.tariffs.iter().filter(|t| t.is_active).count()
    }

    pub fn primary(&self) -> Option<&Tariff> {
        self.tariffs.iter().find(|t| t.is_primary)
    }

    /// Inserts or updates the tariff for `duration_minutes`
    ///
    /// Only a write that turns a duration active (new row, or an inactive row
    /// switched on) is checked against `max_active`.
    pub fn upsert(
        &mut self,
        duration_minutes: u32,
        fields: TariffFields,
        max_active: usize,
        now: DateTime<Utc>,
    ) -> UpsertOutcome {
        let existing = self
            .tariffs
            .iter()
            .position(|t| t.duration_minutes == duration_minutes);

        let was_active = existing.map(|i| self.tariffs[i].is_active).unwrap_or(false);
        let activating = fields.is_active && !was_active;
        let active = self.active_count();
        if activating && active >= max_active {
            return UpsertOutcome::LimitReached { active };
        }

        match existing {
            Some(index) => {
                let tariff = &mut self.tariffs[index];
                tariff.apply(fields, now);
                UpsertOutcome::Updated(tariff.clone())
            }
            None => {
                let tariff = Tariff::new(self.host_id, duration_minutes, fields, now);
                self.tariffs.push(tariff.clone());
                UpsertOutcome::Created(tariff)
            }
        }
    }

    /// Makes `tariff_id` the only primary tariff
    pub fn set_primary(&mut self, tariff_id: TariffId, now: DateTime<Utc>) -> Result<Tariff, PricingError> {
        let target = self
            .get(tariff_id)
            .ok_or_else(|| PricingError::TariffNotFound(tariff_id.to_string()))?;
        if !target.is_active {
            return Err(PricingError::TariffInactive(tariff_id.to_string()));
        }

        let mut promoted = None;
        for tariff in self.tariffs.iter_mut() {
            let should_be_primary = tariff.id == tariff_id;
            if tariff.is_primary != should_be_primary {
                tariff.is_primary = should_be_primary;
                tariff.updated_at = now;
            }
            if should_be_primary {
                promoted = Some(tariff.clone());
            }
        }
        promoted.ok_or_else(|| PricingError::TariffNotFound(tariff_id.to_string()))
    }

    /// Removes a tariff; the caller has already checked booking references
    pub fn remove(&mut self, tariff_id: TariffId) -> Option<Tariff> {
        let index = self.tariffs.iter().position(|t| t.id == tariff_id)?;
        Some(self.tariffs.remove(index))
    }
}
