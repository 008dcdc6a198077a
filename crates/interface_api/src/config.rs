//! API configuration
//!
//! Read from `API_`-prefixed environment variables (for example
//! `API_COMMISSION_RATE=0.12`). Every field has a default so a bare
//! `API_STORAGE_BACKEND=memory` is enough to start a local server.

use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::time::Duration as StdDuration;

use core_kernel::{Currency, MoneyError, Rate};
use domain_billing::{AddonPricing, BillingError, CommissionCalculator, DEFAULT_INVOICE_PREFIX, DEFAULT_TOLERANCE_SECS};
use domain_pricing::DEFAULT_MAX_ACTIVE_TARIFFS;
use domain_verification::DEFAULT_TOKEN_TTL_HOURS;

/// Where the services keep their state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    /// Single-process store, lost on restart
    Memory,
}

/// API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// JWT secret for authentication
    pub jwt_secret: String,
    /// JWT expiration in seconds
    pub jwt_expiration_secs: u64,
    /// Database URL
    pub database_url: String,
    pub storage_backend: StorageBackend,
    /// Log level
    pub log_level: String,
    /// Emit JSON log lines instead of the human format
    pub json_logs: bool,

    pub commission_rate: Decimal,
    pub vat_rate: Decimal,
    pub addon_screen_sharing: Decimal,
    pub addon_translation: Decimal,
    pub addon_recording: Decimal,
    pub addon_transcription: Decimal,
    /// ISO code used when a request omits the currency
    pub currency: String,
    pub invoice_prefix: String,
    pub token_ttl_hours: i64,
    pub max_active_tariffs: usize,

    pub webhook_secret: String,
    pub webhook_tolerance_secs: i64,
    pub processor_base_url: String,
    pub processor_api_key: String,
    pub processor_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let addons = AddonPricing::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            jwt_secret: "change-me-in-production".to_string(),
            jwt_expiration_secs: 3600,
            database_url: "postgres://localhost/marketplace".to_string(),
            storage_backend: StorageBackend::Postgres,
            log_level: "info".to_string(),
            json_logs: false,
            commission_rate: dec!(0.10),
            vat_rate: dec!(0.21),
            addon_screen_sharing: addons.screen_sharing,
            addon_translation: addons.translation,
            addon_recording: addons.recording,
            addon_transcription: addons.transcription,
            currency: "EUR".to_string(),
            invoice_prefix: DEFAULT_INVOICE_PREFIX.to_string(),
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            max_active_tariffs: DEFAULT_MAX_ACTIVE_TARIFFS,
            webhook_secret: "whsec_dev".to_string(),
            webhook_tolerance_secs: DEFAULT_TOLERANCE_SECS,
            processor_base_url: "https://api.stripe.com".to_string(),
            processor_api_key: String::new(),
            processor_timeout_secs: 10,
        }
    }
}

impl ApiConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("API"))
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Commission and VAT rates, both checked to lie in [0, 1]
    pub fn calculator(&self) -> Result<CommissionCalculator, BillingError> {
        CommissionCalculator::new(Rate::new(self.commission_rate), Rate::new(self.vat_rate))
    }

    pub fn addon_pricing(&self) -> AddonPricing {
        AddonPricing {
            screen_sharing: self.addon_screen_sharing,
            translation: self.addon_translation,
            recording: self.addon_recording,
            transcription: self.addon_transcription,
        }
    }

    pub fn default_currency(&self) -> Result<Currency, MoneyError> {
        self.currency.parse()
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::hours(self.token_ttl_hours)
    }

    pub fn processor_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.processor_timeout_secs)
    }
}
