//! Test Data Builders
//!
//! Builders for service inputs with sensible defaults, so a test only
//! names the fields it is about.

use chrono::{NaiveDate, NaiveTime};
use core_kernel::{Money, TariffId, UserId};
use domain_booking::CreateBooking;
use domain_pricing::{Addon, AddonFlags, TariffFields};
use domain_verification::{DocumentKind, NewDocument};
use fake::faker::lorem::en::Sentence;
use fake::Fake;

use crate::fixtures::{MoneyFixtures, StringFixtures, TemporalFixtures};

/// Builder for [`TariffFields`]
pub struct TariffFieldsBuilder {
    price: Money,
    is_active: bool,
    is_custom: bool,
    addons: AddonFlags,
}

impl Default for TariffFieldsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TariffFieldsBuilder {
    /// An active EUR 100 tariff without add-ons
    pub fn new() -> Self {
        Self {
            price: MoneyFixtures::eur_100(),
            is_active: true,
            is_custom: false,
            addons: AddonFlags::default(),
        }
    }

    pub fn with_price(mut self, price: Money) -> Self {
        self.price = price;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn custom(mut self) -> Self {
        self.is_custom = true;
        self
    }

    pub fn with_addons(mut self, addons: AddonFlags) -> Self {
        self.addons = addons;
        self
    }

    pub fn build(self) -> TariffFields {
        TariffFields {
            price: self.price,
            is_active: self.is_active,
            is_custom: self.is_custom,
            addons: self.addons,
        }
    }
}

/// Builder for [`CreateBooking`]
pub struct CreateBookingBuilder {
    host_id: UserId,
    guest_id: UserId,
    tariff_id: TariffId,
    scheduled_date: NaiveDate,
    start_time: NaiveTime,
    services: Vec<Addon>,
    notes: Option<String>,
}

impl CreateBookingBuilder {
    /// A morning session on the fixture date for a fresh guest
    pub fn new(host_id: UserId, tariff_id: TariffId) -> Self {
        Self {
            host_id,
            guest_id: UserId::new(),
            tariff_id,
            scheduled_date: TemporalFixtures::session_date(),
            start_time: TemporalFixtures::morning(),
            services: Vec::new(),
            notes: None,
        }
    }

    pub fn with_guest(mut self, guest_id: UserId) -> Self {
        self.guest_id = guest_id;
        self
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.scheduled_date = date;
        self
    }

    pub fn at(mut self, start_time: NaiveTime) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_service(mut self, addon: Addon) -> Self {
        self.services.push(addon);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Fills `notes` with a random sentence
    pub fn with_random_notes(mut self) -> Self {
        self.notes = Some(Sentence(3..10).fake());
        self
    }

    pub fn build(self) -> CreateBooking {
        CreateBooking {
            host_id: self.host_id,
            guest_id: self.guest_id,
            tariff_id: self.tariff_id,
            scheduled_date: self.scheduled_date,
            start_time: self.start_time,
            services: self.services,
            notes: self.notes,
        }
    }
}

/// Builder for a document submission
#[derive(Default)]
pub struct DocumentsBuilder {
    documents: Vec<NewDocument>,
}

impl DocumentsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(mut self) -> Self {
        self.documents.push(NewDocument {
            kind: DocumentKind::Identity,
            storage_key: StringFixtures::identity_document().to_string(),
        });
        self
    }

    pub fn qualification(mut self) -> Self {
        self.documents.push(NewDocument {
            kind: DocumentKind::Qualification,
            storage_key: StringFixtures::qualification_document().to_string(),
        });
        self
    }

    pub fn build(self) -> Vec<NewDocument> {
        self.documents
    }
}
