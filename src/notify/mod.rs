//! Notification seams
//!
//! The system notification facility is an external collaborator; this module
//! defines the trait boundary the scheduler dispatches through. Re-dispatching
//! with the same tag is expected to replace rather than stack. Permission
//! denial degrades to the in-app broadcast channel only; timing logic is
//! unaffected.

use crate::Result;
use async_trait::async_trait;

/// A rendered notification handed to the system facility
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,

    /// Equal to the reminder id; same-tag redispatch replaces the prior one
    pub tag: String,
}

/// System-level notification facility
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Dispatch a notification.
    ///
    /// # Errors
    /// [`crate::PetalSyncError::NotificationDenied`] when the facility refuses;
    /// callers degrade to the in-app channel and keep scheduling.
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Default notifier that writes through tracing.
///
/// Stands in for the platform facility in headless runs and the demo binary.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            tag = %notification.tag,
            title = %notification.title,
            body = %notification.body,
            "notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_accepts_dispatch() {
        let notifier = LogNotifier;
        let n = Notification {
            title: "Pill time".into(),
            body: "test".into(),
            icon: "💊".into(),
            tag: "r-1".into(),
        };
        assert!(notifier.notify(&n).await.is_ok());
    }
}
