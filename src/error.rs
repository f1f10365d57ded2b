//! Error types for PetalSync
//!
//! Defines a comprehensive error enum covering all failure modes across the
//! scheduling and sync core. Uses thiserror for ergonomic error handling.

use thiserror::Error;

/// Result type alias for PetalSync operations
pub type Result<T> = std::result::Result<T, PetalSyncError>;

/// Comprehensive error type for PetalSync operations
#[derive(Error, Debug)]
pub enum PetalSyncError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Durable-store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Push-channel transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// A send was not acknowledged within the configured timeout
    #[error("Acknowledgment timed out after {0:?}")]
    AckTimeout(std::time::Duration),

    /// Operation requires an active transport session
    #[error("Not connected")]
    NotConnected,

    /// Reminder not found
    #[error("Reminder not found: {0}")]
    ReminderNotFound(String),

    /// System notification facility refused to display
    #[error("Notification permission denied: {0}")]
    NotificationDenied(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),

    /// Anyhow errors (for more context)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

impl PetalSyncError {
    /// Whether a failed send should leave the record queued for retry.
    ///
    /// Transport trouble is transient; everything else is a programming or
    /// configuration problem that retrying will not fix.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PetalSyncError::Transport(_)
                | PetalSyncError::AckTimeout(_)
                | PetalSyncError::NotConnected
                | PetalSyncError::Http(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transport_errors_are_retryable() {
        assert!(PetalSyncError::Transport("boom".into()).is_retryable());
        assert!(PetalSyncError::AckTimeout(Duration::from_secs(10)).is_retryable());
        assert!(PetalSyncError::NotConnected.is_retryable());
    }

    #[test]
    fn test_config_errors_are_not_retryable() {
        assert!(!PetalSyncError::Config("bad".into()).is_retryable());
        assert!(!PetalSyncError::ReminderNotFound("r-1".into()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let e = PetalSyncError::ReminderNotFound("r-42".into());
        assert_eq!(e.to_string(), "Reminder not found: r-42");
    }
}
