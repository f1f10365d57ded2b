//! PetalSync configuration file handling
//!
//! Loads and manages the ~/.config/petalsync/config.yaml file. The missed-dose
//! grace window and snooze-escalation threshold live here rather than as
//! hardcoded constants.

use crate::reminder::ReminderStyle;
use crate::sync::backoff::ReconnectPolicy;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Reminder scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Minutes after a fire before the missed-dose check runs
    #[serde(default = "default_grace_window_mins")]
    pub grace_window_mins: u32,

    /// Snooze count at which dispatch style is forced to urgent
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: u32,

    /// Style a recurring reminder resets to after mark-taken
    #[serde(default)]
    pub default_style: ReminderStyle,
}

fn default_grace_window_mins() -> u32 {
    30
}

fn default_escalation_threshold() -> u32 {
    3
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            grace_window_mins: default_grace_window_mins(),
            escalation_threshold: default_escalation_threshold(),
            default_style: ReminderStyle::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn grace_window(&self) -> Duration {
        Duration::from_secs(u64::from(self.grace_window_mins) * 60)
    }

    /// Set the grace window in minutes
    pub fn with_grace_window_mins(mut self, mins: u32) -> Self {
        self.grace_window_mins = mins;
        self
    }

    /// Set the escalation threshold
    pub fn with_escalation_threshold(mut self, threshold: u32) -> Self {
        self.escalation_threshold = threshold;
        self
    }
}

/// Sync engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds to wait for a send acknowledgment
    #[serde(default = "default_ack_timeout_secs")]
    pub ack_timeout_secs: u64,

    /// Milliseconds before the first reconnect attempt
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    /// Upper bound on any single reconnect delay, milliseconds
    #[serde(default = "default_reconnect_cap_ms")]
    pub reconnect_cap_ms: u64,

    /// Reconnect attempts before waiting for the next external trigger
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
}

fn default_ack_timeout_secs() -> u64 {
    10
}

fn default_reconnect_base_ms() -> u64 {
    1_000
}

fn default_reconnect_cap_ms() -> u64 {
    30_000
}

fn default_reconnect_max_attempts() -> u32 {
    5
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ack_timeout_secs: default_ack_timeout_secs(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_cap_ms: default_reconnect_cap_ms(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
        }
    }
}

impl SyncConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }

    /// Build the reconnect policy from the configured delays
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base: Duration::from_millis(self.reconnect_base_ms),
            cap: Duration::from_millis(self.reconnect_cap_ms),
            max_attempts: self.reconnect_max_attempts,
            ..Default::default()
        }
    }

    /// Set the ack timeout in seconds
    pub fn with_ack_timeout_secs(mut self, secs: u64) -> Self {
        self.ack_timeout_secs = secs;
        self
    }
}

/// PetalSync configuration
///
/// Represents the complete ~/.config/petalsync/config.yaml file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Identity tag stamped on every outbound sync record
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Logical user all devices belong to
    pub user_id: Option<String>,

    /// Path to the durable pending-record database
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Base URL of the intake-logging API; None disables reporting
    pub intake_api: Option<String>,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub sync: SyncConfig,
}

fn default_device_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "device".to_string());

    // Suffix keeps two processes on one host distinguishable
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("{}-{:06}", host, nanos % 1_000_000)
}

fn default_db_path() -> PathBuf {
    // Always use ~/.config for consistency across platforms (macOS, Linux)
    let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(".config");
    path.push("petalsync");
    path.push("pending.db");
    path
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            device_id: default_device_id(),
            user_id: None,
            db_path: default_db_path(),
            intake_api: None,
            scheduler: SchedulerConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl CoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default config file location (~/.config/petalsync/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("petalsync");
        path.push("config.yaml");
        path
    }

    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a YAML file, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;
        Ok(())
    }

    /// Set the device id
    pub fn with_device_id(mut self, id: impl Into<String>) -> Self {
        self.device_id = id.into();
        self
    }

    /// Set the user id
    pub fn with_user_id(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    /// Set the pending-record database path
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    /// Set the intake API base URL
    pub fn with_intake_api(mut self, url: impl Into<String>) -> Self {
        self.intake_api = Some(url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_product_constants() {
        let config = CoreConfig::default();
        assert_eq!(config.scheduler.grace_window_mins, 30);
        assert_eq!(config.scheduler.escalation_threshold, 3);
        assert_eq!(config.sync.ack_timeout_secs, 10);
        assert_eq!(config.sync.reconnect_max_attempts, 5);
        assert_eq!(
            config.sync.reconnect_policy().base,
            Duration::from_secs(1)
        );
        assert_eq!(config.sync.reconnect_policy().cap, Duration::from_secs(30));
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");

        let config = CoreConfig::new()
            .with_device_id("phone-1")
            .with_user_id("u-1")
            .with_intake_api("https://api.petal.example");
        config.save(&path).unwrap();

        let loaded = CoreConfig::load(&path).unwrap();
        assert_eq!(loaded.device_id, "phone-1");
        assert_eq!(loaded.user_id.as_deref(), Some("u-1"));
        assert_eq!(loaded.intake_api.as_deref(), Some("https://api.petal.example"));
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "device_id: tablet-7\nuser_id: u-2\n";
        let config: CoreConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.device_id, "tablet-7");
        assert_eq!(config.scheduler.escalation_threshold, 3);
        assert_eq!(config.sync.reconnect_base_ms, 1_000);
    }

    #[test]
    fn test_device_ids_are_distinct_per_process_moment() {
        // Same host, different nanos suffix almost surely
        let a = default_device_id();
        assert!(a.contains('-'));
    }
}
