//! Inbound record application
//!
//! Each domain category gets one [`RecordApplier`]. The registry guards every
//! category with a last-write-wins watermark ordered by
//! (timestamp, origin device id): records at or below the watermark are
//! discarded as stale, so out-of-order arrival converges to the latest write.
//! Device id breaks timestamp ties deterministically on every device.

use super::{DiscardReason, RecordType, SyncRecord};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Applies an inbound record of one category to local domain state
#[async_trait]
pub trait RecordApplier: Send + Sync {
    async fn apply(&self, record: &SyncRecord) -> Result<()>;
}

/// Outcome of offering a record to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Discarded(DiscardReason),
}

/// Per-category applier registry with last-write-wins ordering
pub struct ApplierRegistry {
    appliers: HashMap<RecordType, Arc<dyn RecordApplier>>,

    /// Highest (timestamp, origin device) applied per category
    watermarks: HashMap<RecordType, (i64, String)>,
}

impl Default for ApplierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplierRegistry {
    pub fn new() -> Self {
        Self {
            appliers: HashMap::new(),
            watermarks: HashMap::new(),
        }
    }

    /// Register the applier for a category, replacing any existing one
    pub fn register(&mut self, record_type: RecordType, applier: Arc<dyn RecordApplier>) {
        self.appliers.insert(record_type, applier);
    }

    /// Offer a record. Stale records (at or below the category watermark) are
    /// discarded; newer ones run through the applier and advance the
    /// watermark.
    pub async fn offer(&mut self, record: &SyncRecord) -> Result<ApplyOutcome> {
        let incoming = (record.timestamp, record.origin_device_id.as_str());
        if let Some((ts, device)) = self.watermarks.get(&record.record_type) {
            if incoming <= (*ts, device.as_str()) {
                tracing::debug!(
                    record_type = %record.record_type,
                    timestamp = record.timestamp,
                    "Discarding stale record"
                );
                return Ok(ApplyOutcome::Discarded(DiscardReason::Stale));
            }
        }

        if let Some(applier) = self.appliers.get(&record.record_type) {
            applier.apply(record).await?;
        } else {
            tracing::debug!(record_type = %record.record_type, "No applier registered");
        }

        self.watermarks.insert(
            record.record_type,
            (record.timestamp, record.origin_device_id.clone()),
        );
        Ok(ApplyOutcome::Applied)
    }
}

/// Applier that keeps the latest payload per category.
///
/// Enough for settings-style categories in the demo binary, and the
/// convergence harness in tests.
#[derive(Default)]
pub struct LatestValueApplier {
    current: std::sync::Mutex<Option<serde_json::Value>>,
}

impl LatestValueApplier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The most recently applied payload
    pub fn current(&self) -> Option<serde_json::Value> {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl RecordApplier for LatestValueApplier {
    async fn apply(&self, record: &SyncRecord) -> Result<()> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current = Some(record.payload.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings_record(timestamp: i64, device: &str, value: &str) -> SyncRecord {
        SyncRecord {
            user_id: "u-1".into(),
            record_type: RecordType::Settings,
            payload: json!({ "theme": value }),
            timestamp,
            origin_device_id: device.into(),
        }
    }

    #[tokio::test]
    async fn test_later_timestamp_wins_in_order() {
        let applier = LatestValueApplier::new();
        let mut registry = ApplierRegistry::new();
        registry.register(RecordType::Settings, applier.clone());

        registry.offer(&settings_record(100, "phone-1", "light")).await.unwrap();
        registry.offer(&settings_record(200, "tablet-2", "dark")).await.unwrap();

        assert_eq!(applier.current().unwrap()["theme"], "dark");
    }

    #[tokio::test]
    async fn test_later_timestamp_wins_out_of_order() {
        let applier = LatestValueApplier::new();
        let mut registry = ApplierRegistry::new();
        registry.register(RecordType::Settings, applier.clone());

        registry.offer(&settings_record(200, "tablet-2", "dark")).await.unwrap();
        let outcome = registry
            .offer(&settings_record(100, "phone-1", "light"))
            .await
            .unwrap();

        assert_eq!(outcome, ApplyOutcome::Discarded(DiscardReason::Stale));
        assert_eq!(applier.current().unwrap()["theme"], "dark");
    }

    #[tokio::test]
    async fn test_identical_timestamp_breaks_tie_by_device_id() {
        let applier = LatestValueApplier::new();
        let mut registry = ApplierRegistry::new();
        registry.register(RecordType::Settings, applier.clone());

        registry.offer(&settings_record(100, "a-phone", "light")).await.unwrap();
        registry.offer(&settings_record(100, "b-tablet", "dark")).await.unwrap();
        // Same timestamp, lower device id: stale regardless of arrival order
        let outcome = registry
            .offer(&settings_record(100, "a-phone", "light"))
            .await
            .unwrap();

        assert_eq!(outcome, ApplyOutcome::Discarded(DiscardReason::Stale));
        assert_eq!(applier.current().unwrap()["theme"], "dark");
    }

    #[tokio::test]
    async fn test_categories_have_independent_watermarks() {
        let mut registry = ApplierRegistry::new();
        let settings = LatestValueApplier::new();
        let mood = LatestValueApplier::new();
        registry.register(RecordType::Settings, settings.clone());
        registry.register(RecordType::Mood, mood.clone());

        registry.offer(&settings_record(200, "phone-1", "dark")).await.unwrap();

        let mood_record = SyncRecord {
            user_id: "u-1".into(),
            record_type: RecordType::Mood,
            payload: json!({ "mood": "calm" }),
            timestamp: 100,
            origin_device_id: "phone-1".into(),
        };
        let outcome = registry.offer(&mood_record).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);
    }

    #[tokio::test]
    async fn test_unregistered_category_still_advances_watermark() {
        let mut registry = ApplierRegistry::new();
        let record = settings_record(100, "phone-1", "dark");
        assert_eq!(registry.offer(&record).await.unwrap(), ApplyOutcome::Applied);
        assert_eq!(
            registry.offer(&record).await.unwrap(),
            ApplyOutcome::Discarded(DiscardReason::Stale)
        );
    }
}
