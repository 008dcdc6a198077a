//! PostgreSQL host verification adapter

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::instrument;
use uuid::Uuid;

use core_kernel::{DocumentId, DomainPort, PortError, UserId};
use domain_verification::{
    DocumentDecision, DocumentKind, DocumentStamp, HostVerification, Reviewer, VerificationDocument,
    VerificationPort, VerificationStatus, VerificationWrite,
};

use crate::error::DatabaseError;

const VERIFICATION_COLUMNS: &str = "user_id, status, activation_token, token_expiry, rejection_reason, verified_by, \
     verified_at, connected_account_id, payouts_enabled, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct VerificationRow {
    user_id: Uuid,
    status: String,
    activation_token: Option<String>,
    token_expiry: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    verified_by: Option<String>,
    verified_at: Option<DateTime<Utc>>,
    connected_account_id: Option<String>,
    payouts_enabled: bool,
    updated_at: DateTime<Utc>,
}

fn reviewer(value: Option<String>) -> Result<Option<Reviewer>, DatabaseError> {
    value
        .as_deref()
        .map(Reviewer::from_storage)
        .transpose()
        .map_err(|e| DatabaseError::decode(e.to_string()))
}

impl TryFrom<VerificationRow> for HostVerification {
    type Error = DatabaseError;

    fn try_from(row: VerificationRow) -> Result<Self, Self::Error> {
        Ok(HostVerification {
            user_id: UserId::from_uuid(row.user_id),
            status: row
                .status
                .parse::<VerificationStatus>()
                .map_err(|e| DatabaseError::decode(e.to_string()))?,
            activation_token: row.activation_token,
            token_expiry: row.token_expiry,
            rejection_reason: row.rejection_reason,
            verified_by: reviewer(row.verified_by)?,
            verified_at: row.verified_at,
            connected_account_id: row.connected_account_id,
            payouts_enabled: row.payouts_enabled,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DocumentRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    storage_key: String,
    decision: String,
    reviewed_by: Option<String>,
    reviewed_at: Option<DateTime<Utc>>,
    submitted_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for VerificationDocument {
    type Error = DatabaseError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(VerificationDocument {
            id: DocumentId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            kind: row
                .kind
                .parse::<DocumentKind>()
                .map_err(|e| DatabaseError::decode(e.to_string()))?,
            storage_key: row.storage_key,
            decision: row
                .decision
                .parse::<DocumentDecision>()
                .map_err(|e| DatabaseError::decode(e.to_string()))?,
            reviewed_by: reviewer(row.reviewed_by)?,
            reviewed_at: row.reviewed_at,
            submitted_at: row.submitted_at,
        })
    }
}

/// PostgreSQL implementation of `VerificationPort`
///
/// The record update is guarded by `status = expected`; a missing row counts
/// as `unregistered`. Documents and review stamps go in the same transaction.
#[derive(Debug, Clone)]
pub struct PostgresVerificationAdapter {
    pool: PgPool,
}

impl PostgresVerificationAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_where(&self, column: &str, value: &str) -> Result<Option<HostVerification>, DatabaseError> {
        let row: Option<VerificationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM host_verifications WHERE {} = $1",
            VERIFICATION_COLUMNS, column
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await?;
        row.map(HostVerification::try_from).transpose()
    }

    async fn fetch_for_user(&self, user_id: UserId) -> Result<Option<HostVerification>, DatabaseError> {
        let row: Option<VerificationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM host_verifications WHERE user_id = $1",
            VERIFICATION_COLUMNS
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(HostVerification::try_from).transpose()
    }

    /// Writes the record if its stored status is `expected`; returns the
    /// number of rows written
    async fn guarded_write(
        tx: &mut Transaction<'_, Postgres>,
        record: &HostVerification,
        expected: VerificationStatus,
    ) -> Result<u64, DatabaseError> {
        let sql = if expected == VerificationStatus::Unregistered {
            r#"
            INSERT INTO host_verifications (user_id, status, activation_token, token_expiry, rejection_reason,
                                            verified_by, verified_at, connected_account_id, payouts_enabled,
                                            updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (user_id) DO UPDATE SET
                status = EXCLUDED.status,
                activation_token = EXCLUDED.activation_token,
                token_expiry = EXCLUDED.token_expiry,
                rejection_reason = EXCLUDED.rejection_reason,
                verified_by = EXCLUDED.verified_by,
                verified_at = EXCLUDED.verified_at,
                connected_account_id = EXCLUDED.connected_account_id,
                payouts_enabled = EXCLUDED.payouts_enabled,
                updated_at = EXCLUDED.updated_at
            WHERE host_verifications.status = $11
            "#
        } else {
            r#"
            UPDATE host_verifications SET
                status = $2,
                activation_token = $3,
                token_expiry = $4,
                rejection_reason = $5,
                verified_by = $6,
                verified_at = $7,
                connected_account_id = $8,
                payouts_enabled = $9,
                updated_at = $10
            WHERE user_id = $1 AND status = $11
            "#
        };

        let result = sqlx::query(sql)
            .bind(record.user_id.as_uuid())
            .bind(record.status.as_str())
            .bind(record.activation_token.as_deref())
            .bind(record.token_expiry)
            .bind(record.rejection_reason.as_deref())
            .bind(record.verified_by.map(|r| r.to_storage()))
            .bind(record.verified_at)
            .bind(record.connected_account_id.as_deref())
            .bind(record.payouts_enabled)
            .bind(record.updated_at)
            .bind(expected.as_str())
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_document(
        tx: &mut Transaction<'_, Postgres>,
        document: &VerificationDocument,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO verification_documents (id, user_id, kind, storage_key, decision, reviewed_by,
                                                reviewed_at, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(document.id.as_uuid())
        .bind(document.user_id.as_uuid())
        .bind(document.kind.as_str())
        .bind(&document.storage_key)
        .bind(document.decision.as_str())
        .bind(document.reviewed_by.map(|r| r.to_storage()))
        .bind(document.reviewed_at)
        .bind(document.submitted_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn stamp_documents(
        tx: &mut Transaction<'_, Postgres>,
        user_id: UserId,
        stamp: &DocumentStamp,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "UPDATE verification_documents SET decision = $2, reviewed_by = $3, reviewed_at = $4 WHERE user_id = $1",
        )
        .bind(user_id.as_uuid())
        .bind(stamp.decision.as_str())
        .bind(stamp.reviewer.to_storage())
        .bind(stamp.at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// `Ok(None)` when the status guard did not match
    async fn write(&self, write: &VerificationWrite) -> Result<Option<HostVerification>, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        if Self::guarded_write(&mut tx, &write.record, write.expected).await? == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        for document in &write.new_documents {
            Self::insert_document(&mut tx, document).await?;
        }
        if let Some(stamp) = &write.stamp {
            Self::stamp_documents(&mut tx, write.record.user_id, stamp).await?;
        }

        tx.commit().await?;
        Ok(Some(write.record.clone()))
    }

    async fn fetch_documents(&self, user_id: UserId) -> Result<Vec<VerificationDocument>, DatabaseError> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, kind, storage_key, decision, reviewed_by, reviewed_at, submitted_at
            FROM verification_documents
            WHERE user_id = $1
            ORDER BY submitted_at, id
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(VerificationDocument::try_from).collect()
    }
}

impl DomainPort for PostgresVerificationAdapter {}

#[async_trait]
impl VerificationPort for PostgresVerificationAdapter {
    async fn get_verification(&self, user_id: UserId) -> Result<Option<HostVerification>, PortError> {
        Ok(self.fetch_for_user(user_id).await?)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<HostVerification>, PortError> {
        Ok(self.fetch_where("activation_token", token).await?)
    }

    async fn find_by_connected_account(&self, account_id: &str) -> Result<Option<HostVerification>, PortError> {
        Ok(self.fetch_where("connected_account_id", account_id).await?)
    }

    #[instrument(skip(self, write), fields(user_id = %write.record.user_id, to = %write.record.status))]
    async fn write_verification(&self, write: VerificationWrite) -> Result<HostVerification, PortError> {
        match self.write(&write).await? {
            Some(record) => Ok(record),
            None => Err(PortError::conflict(format!(
                "verification for {} is no longer {}",
                write.record.user_id, write.expected
            ))),
        }
    }

    async fn list_documents(&self, user_id: UserId) -> Result<Vec<VerificationDocument>, PortError> {
        Ok(self.fetch_documents(user_id).await?)
    }
}
