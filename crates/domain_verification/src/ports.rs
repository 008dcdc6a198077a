//! Verification Domain Ports
//!
//! Every write is a compare-and-swap on the stored status: the adapter
//! applies it only if the row still has the status the transition started
//! from, and fails with `PortError::Conflict` otherwise. New documents and
//! review stamps are written in the same transaction as the record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use core_kernel::{DomainPort, PortError, UserId};

use crate::document::{DocumentDecision, VerificationDocument};
use crate::verification::{HostVerification, Reviewer, VerificationStatus};

/// Decision applied to every document of the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentStamp {
    pub decision: DocumentDecision,
    pub reviewer: Reviewer,
    pub at: DateTime<Utc>,
}

/// One atomic verification write
#[derive(Debug, Clone)]
pub struct VerificationWrite {
    /// The record after the transition
    pub record: HostVerification,
    /// Status the stored row must still have; `Unregistered` also matches a
    /// missing row
    pub expected: VerificationStatus,
    pub new_documents: Vec<VerificationDocument>,
    pub stamp: Option<DocumentStamp>,
}

impl VerificationWrite {
    pub fn new(record: HostVerification, expected: VerificationStatus) -> Self {
        Self {
            record,
            expected,
            new_documents: Vec::new(),
            stamp: None,
        }
    }

    pub fn with_documents(mut self, documents: Vec<VerificationDocument>) -> Self {
        self.new_documents = documents;
        self
    }

    pub fn with_stamp(mut self, stamp: DocumentStamp) -> Self {
        self.stamp = Some(stamp);
        self
    }
}

#[async_trait]
pub trait VerificationPort: DomainPort {
    async fn get_verification(&self, user_id: UserId) -> Result<Option<HostVerification>, PortError>;

    async fn find_by_token(&self, token: &str) -> Result<Option<HostVerification>, PortError>;

    async fn find_by_connected_account(&self, account_id: &str) -> Result<Option<HostVerification>, PortError>;

    /// Applies a transition atomically
    ///
    /// # Errors
    ///
    /// `PortError::Conflict` when the stored status no longer equals
    /// `write.expected`
    async fn write_verification(&self, write: VerificationWrite) -> Result<HostVerification, PortError>;

    async fn list_documents(&self, user_id: UserId) -> Result<Vec<VerificationDocument>, PortError>;
}

/// In-memory implementation of VerificationPort for unit tests
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[derive(Debug, Default)]
    struct State {
        records: HashMap<UserId, HostVerification>,
        documents: Vec<VerificationDocument>,
    }

    #[derive(Debug, Default, Clone)]
    pub struct MockVerificationPort {
        state: Arc<RwLock<State>>,
    }

    impl MockVerificationPort {
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds a record, bypassing the state machine
        pub async fn insert(&self, record: HostVerification) {
            self.state.write().await.records.insert(record.user_id, record);
        }
    }

    impl DomainPort for MockVerificationPort {}

    #[async_trait]
    impl VerificationPort for MockVerificationPort {
        async fn get_verification(&self, user_id: UserId) -> Result<Option<HostVerification>, PortError> {
            Ok(self.state.read().await.records.get(&user_id).cloned())
        }

        async fn find_by_token(&self, token: &str) -> Result<Option<HostVerification>, PortError> {
            let state = self.state.read().await;
            Ok(state
                .records
                .values()
                .find(|r| r.activation_token.as_deref() == Some(token))
                .cloned())
        }

        async fn find_by_connected_account(&self, account_id: &str) -> Result<Option<HostVerification>, PortError> {
            let state = self.state.read().await;
            Ok(state
                .records
                .values()
                .find(|r| r.connected_account_id.as_deref() == Some(account_id))
                .cloned())
        }

        async fn write_verification(&self, write: VerificationWrite) -> Result<HostVerification, PortError> {
            let mut state = self.state.write().await;
            let user_id = write.record.user_id;
            let current = state
                .records
                .get(&user_id)
                .map(|r| r.status)
                .unwrap_or(VerificationStatus::Unregistered);
            if current != write.expected {
                return Err(PortError::conflict(format!(
                    "verification for {} is {}, expected {}",
                    user_id, current, write.expected
                )));
            }
            state.documents.extend(write.new_documents);
            if let Some(stamp) = write.stamp {
                for doc in state.documents.iter_mut().filter(|d| d.user_id == user_id) {
                    doc.stamp(stamp.decision, stamp.reviewer, stamp.at);
                }
            }
            state.records.insert(user_id, write.record.clone());
            Ok(write.record)
        }

        async fn list_documents(&self, user_id: UserId) -> Result<Vec<VerificationDocument>, PortError> {
            let state = self.state.read().await;
            Ok(state.documents.iter().filter(|d| d.user_id == user_id).cloned().collect())
        }
    }
}
