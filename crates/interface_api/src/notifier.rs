//! Notification sink for deployments without a mail service

use async_trait::async_trait;
use tracing::info;

use core_kernel::{DomainPort, Notification, NotificationPort, PortError};

/// Writes each notification to the log
///
/// Template rendering and delivery live in a separate service; this keeps
/// the API usable on its own. Activation tokens are never logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

impl DomainPort for LoggingNotifier {}

#[async_trait]
impl NotificationPort for LoggingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), PortError> {
        match &notification {
            Notification::ActivationRequested { expires_at, .. } => info!(
                kind = notification.kind(),
                recipient = %notification.recipient(),
                expires_at = %expires_at,
                "Notification queued"
            ),
            other => info!(
                kind = other.kind(),
                recipient = %other.recipient(),
                "Notification queued"
            ),
        }
        Ok(())
    }
}
