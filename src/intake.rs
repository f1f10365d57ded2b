//! Intake-logging collaborator client
//!
//! Reports taken and missed doses to the external intake API. The trait seam
//! lets tests record events without a network; the reqwest client is the real
//! implementation.

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A taken or missed dose report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeEvent {
    pub user_id: String,
    pub pill_type: String,

    /// When the dose was taken or confirmed missed
    pub occurred_at: DateTime<Utc>,

    /// When the reminder was originally scheduled to fire
    pub scheduled_time: DateTime<Utc>,
}

/// External intake-logging collaborator
#[async_trait]
pub trait IntakeLogger: Send + Sync {
    async fn log_taken(&self, event: &IntakeEvent) -> Result<()>;
    async fn log_missed(&self, event: &IntakeEvent) -> Result<()>;
}

/// HTTP client for the intake API
#[derive(Debug)]
pub struct IntakeApiClient {
    base_url: String,
    client: reqwest::Client,
}

/// Wire format for taken reports
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TakenRequest<'a> {
    user_id: &'a str,
    pill_type: &'a str,
    taken_at: DateTime<Utc>,
    scheduled_time: DateTime<Utc>,
}

/// Wire format for missed reports
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MissedRequest<'a> {
    user_id: &'a str,
    pill_type: &'a str,
    missed_at: DateTime<Utc>,
    scheduled_time: DateTime<Utc>,
}

impl IntakeApiClient {
    /// Create a client for the given API base URL (no trailing slash)
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl IntakeLogger for IntakeApiClient {
    async fn log_taken(&self, event: &IntakeEvent) -> Result<()> {
        let request = TakenRequest {
            user_id: &event.user_id,
            pill_type: &event.pill_type,
            taken_at: event.occurred_at,
            scheduled_time: event.scheduled_time,
        };

        self.client
            .post(self.url("intake/taken"))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        tracing::debug!(user = %event.user_id, pill = %event.pill_type, "Logged taken intake");
        Ok(())
    }

    async fn log_missed(&self, event: &IntakeEvent) -> Result<()> {
        let request = MissedRequest {
            user_id: &event.user_id,
            pill_type: &event.pill_type,
            missed_at: event.occurred_at,
            scheduled_time: event.scheduled_time,
        };

        self.client
            .post(self.url("intake/missed"))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        tracing::debug!(user = %event.user_id, pill = %event.pill_type, "Logged missed intake");
        Ok(())
    }
}

/// No-op logger for when no intake API is configured
#[derive(Debug, Default)]
pub struct NullIntakeLogger;

#[async_trait]
impl IntakeLogger for NullIntakeLogger {
    async fn log_taken(&self, _event: &IntakeEvent) -> Result<()> {
        Ok(())
    }

    async fn log_missed(&self, _event: &IntakeEvent) -> Result<()> {
        Ok(())
    }
}
