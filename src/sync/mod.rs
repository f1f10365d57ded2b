//! Cross-device sync: records, status, durable queue, transport, engine
//!
//! A [`SyncRecord`] is a timestamped, device-tagged unit of domain change.
//! Records are queued durably, delivered at-least-once over the push channel,
//! and applied on the receiving side through per-category handlers with a
//! last-write-wins conflict policy.

pub mod backoff;
pub mod engine;
pub mod handlers;
pub mod store;
pub mod transport;

pub use engine::SyncEngine;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Domain category a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Pill,
    Mood,
    Cycle,
    Insights,
    Settings,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Pill => "pill",
            RecordType::Mood => "mood",
            RecordType::Cycle => "cycle",
            RecordType::Insights => "insights",
            RecordType::Settings => "settings",
        }
    }
}

impl std::str::FromStr for RecordType {
    type Err = crate::PetalSyncError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pill" => Ok(RecordType::Pill),
            "mood" => Ok(RecordType::Mood),
            "cycle" => Ok(RecordType::Cycle),
            "insights" => Ok(RecordType::Insights),
            "settings" => Ok(RecordType::Settings),
            other => Err(crate::PetalSyncError::Storage(format!(
                "Unknown record type: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of domain change queued for cross-device propagation.
///
/// Never mutated in place; identity is (`timestamp`, `record_type`,
/// `origin_device_id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    pub user_id: String,

    #[serde(rename = "type")]
    pub record_type: RecordType,

    /// Opaque domain data
    pub payload: serde_json::Value,

    /// Wall-clock milliseconds; the logical ordering key
    pub timestamp: i64,

    pub origin_device_id: String,
}

/// Dedup/identity key for a record
pub type RecordKey = (i64, RecordType, String);

impl SyncRecord {
    /// Build a record for a local domain write, stamped with now and the
    /// local device id.
    pub fn local_write(
        user_id: impl Into<String>,
        record_type: RecordType,
        payload: serde_json::Value,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            record_type,
            payload,
            timestamp: Utc::now().timestamp_millis(),
            origin_device_id: device_id.into(),
        }
    }

    pub fn key(&self) -> RecordKey {
        (self.timestamp, self.record_type, self.origin_device_id.clone())
    }

    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }
}

/// Observable connection snapshot, recomputed and broadcast on every engine
/// state transition. Derived state only; never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    pub pending_change_count: usize,
    pub sync_in_progress: bool,
}

/// Events emitted by the sync engine
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Transport session established
    Connected,

    /// Transport session closed or lost
    Disconnected,

    /// A local write was queued for delivery
    RecordQueued { key: RecordKey },

    /// An outbound record was acknowledged and removed from the queue
    RecordAcked { key: RecordKey },

    /// An inbound record was applied through its category handler
    RecordApplied { key: RecordKey },

    /// An inbound record was dropped (echo or stale timestamp)
    RecordDiscarded { key: RecordKey, reason: DiscardReason },

    /// A reconnect attempt was scheduled
    ReconnectScheduled { attempt: u32, delay_ms: u64 },

    /// Reconnection gave up until the next external trigger
    ReconnectGaveUp { attempts: u32 },

    /// A full-sync exchange finished
    FullSyncCompleted { applied: usize },

    /// Error occurred
    Error { message: String },
}

/// Why an inbound record was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Originated on this device; applying it would be an echo loop
    Echo,
    /// Older than the last applied write for its category
    Stale,
}
