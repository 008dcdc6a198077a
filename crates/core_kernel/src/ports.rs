//! Ports and Adapters Infrastructure
//!
//! This module provides the foundational types for implementing the hexagonal
//! architecture (ports and adapters) pattern across all domain modules.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Application Services                      │
//! │  (TariffStore, BookingService, WebhookReconciler, ...)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Port Traits                             │
//! │  (TariffPort, BookingPort, PaymentPort, InvoicePort, ...)    │
//! │   Defined in each domain, depend only on core_kernel         │
//! └─────────────────────────────────────────────────────────────┘
//!                    ▲                         ▲
//!                    │                         │
//!         ┌─────────┴─────────┐     ┌────────┴────────┐
//!         │  PostgreSQL       │     │  In-memory store │
//!         │  adapters         │     │  (single lock)   │
//!         └───────────────────┘     └──────────────────┘
//! ```
//!
//! Every operation that must look atomic to concurrent callers (tariff cap,
//! primary switch, slot booking, invoice numbering, webhook ledger) is a
//! single port method. Services never compose them out of a read followed by
//! a write.

use std::fmt;
use thiserror::Error;
use serde::{Deserialize, Serialize};

/// Failure reported by a storage or notification adapter.
///
/// Domain crates translate these into their own error enums; the variants
/// only carry what those translations look at.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("{entity_type} {id} does not exist")]
    NotFound {
        entity_type: String,
        id: String,
    },

    #[error("rejected by storage: {message}")]
    Validation {
        message: String,
    },

    /// A uniqueness or compare-and-set guard refused the write
    /// (slot taken, tariff inactive, status moved on).
    #[error("conflict: {message}")]
    Conflict {
        message: String,
    },

    /// Concurrent writers collided (serialization failure, deadlock);
    /// the whole operation may be retried.
    #[error("contention during {operation}")]
    Contention {
        operation: String,
    },

    #[error("storage unreachable: {message}")]
    Connection {
        message: String,
    },

    #[error("adapter failure: {message}")]
    Internal {
        message: String,
    },
}

impl PortError {
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        PortError::Validation { message: message.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        PortError::Conflict { message: message.into() }
    }

    pub fn contention(operation: impl Into<String>) -> Self {
        PortError::Contention { operation: operation.into() }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        PortError::Connection { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal { message: message.into() }
    }

    /// Whether retrying the same call could succeed. The API layer answers
    /// these with 503 instead of 500.
    pub fn is_transient(&self) -> bool {
        matches!(self, PortError::Connection { .. } | PortError::Contention { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, PortError::Conflict { .. })
    }
}

/// Supertrait of every port so adapters can sit behind `Arc<dyn _>` in
/// async handlers.
pub trait DomainPort: Send + Sync + 'static {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterHealth {
    Healthy,
    /// Answering, but slowly or with partial capacity
    Degraded,
    Unhealthy,
    Unknown,
}

/// Outcome of one readiness check, serialized as-is by `/health/ready`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub adapter_id: String,
    pub status: AdapterHealth,
    pub latency_ms: u64,
    pub message: Option<String>,
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

impl HealthCheckResult {
    /// Builds a healthy result with no latency, for adapters without I/O
    pub fn healthy(adapter_id: impl Into<String>) -> Self {
        Self {
            adapter_id: adapter_id.into(),
            status: AdapterHealth::Healthy,
            latency_ms: 0,
            message: None,
            checked_at: chrono::Utc::now(),
        }
    }
}

#[async_trait::async_trait]
pub trait HealthCheckable: Send + Sync {
    async fn health_check(&self) -> HealthCheckResult;
}
