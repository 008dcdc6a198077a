//! PostgreSQL webhook event ledger

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use core_kernel::{DomainPort, PortError};
use domain_billing::{EventClaim, WebhookLedgerPort};

use crate::error::DatabaseError;

/// PostgreSQL implementation of `WebhookLedgerPort`
///
/// Claiming is one upsert: a new event id inserts a `received` row, a
/// redelivery bumps `attempts`. The returned status decides the claim.
#[derive(Debug, Clone)]
pub struct PostgresWebhookLedger {
    pool: PgPool,
}

impl PostgresWebhookLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn claim(&self, event_id: &str, event_type: &str) -> Result<EventClaim, DatabaseError> {
        let (status, attempts): (String, i32) = sqlx::query_as(
            r#"
            INSERT INTO webhook_events (event_id, event_type, status, attempts, received_at)
            VALUES ($1, $2, 'received', 1, now())
            ON CONFLICT (event_id) DO UPDATE SET attempts = webhook_events.attempts + 1
            RETURNING status, attempts
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(match (status.as_str(), attempts) {
            ("processed", _) => EventClaim::AlreadyProcessed,
            ("received", 1) => EventClaim::Fresh,
            ("received", n) => EventClaim::Retry {
                attempts: u32::try_from(n).map_err(|_| DatabaseError::decode("negative attempts"))?,
            },
            (other, _) => return Err(DatabaseError::decode(format!("unknown webhook status '{}'", other))),
        })
    }

    async fn finish(&self, event_id: &str, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let updated = sqlx::query(
            "UPDATE webhook_events SET status = 'processed', processed_at = $2 WHERE event_id = $1",
        )
        .bind(event_id)
        .bind(at)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(DatabaseError::not_found("WebhookEvent", event_id));
        }
        Ok(())
    }
}

impl DomainPort for PostgresWebhookLedger {}

#[async_trait]
impl WebhookLedgerPort for PostgresWebhookLedger {
    #[instrument(skip(self))]
    async fn claim_event(&self, event_id: &str, event_type: &str) -> Result<EventClaim, PortError> {
        Ok(self.claim(event_id, event_type).await?)
    }

    async fn mark_processed(&self, event_id: &str, at: DateTime<Utc>) -> Result<(), PortError> {
        Ok(self.finish(event_id, at).await?)
    }
}
