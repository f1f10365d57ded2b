//! PetalSync - Reminder Scheduling and Offline Multi-Device Sync Core
//!
//! PetalSync is the timing and synchronization core of the Petal pill and
//! cycle tracker. It owns the two subsystems that are easy to get subtly
//! wrong: a per-reminder timer state machine with escalating snooze and
//! missed-dose detection, and a durable offline-queue sync engine that
//! reconciles changes across a user's devices under unreliable connectivity.
//! Presentation glue (views, routing, CRUD REST clients, theming) lives
//! outside this crate and talks to it through its public operations.
//!
//! # Architecture
//!
//! - **reminder**: Reminder model, message tiers, and the timer-driven
//!   scheduler (fire / snooze-escalation / missed-check lifecycle)
//! - **sync**: SyncRecord model, durable pending queue (SQLite), push-channel
//!   transport seam, per-category appliers, and the sync engine with
//!   reconnection backoff
//! - **notify**: System-notification seam; denial degrades to in-app events
//! - **intake**: External intake-logging collaborator client
//! - **config**: YAML configuration with the tunable grace window and
//!   escalation threshold
//! - **metrics**: Prometheus observability
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use petalsync::config::CoreConfig;
//! use petalsync::intake::NullIntakeLogger;
//! use petalsync::notify::LogNotifier;
//! use petalsync::reminder::{ReminderScheduler, ReminderSpec, ReminderKind, ReminderStyle};
//! use petalsync::sync::store::PendingStore;
//! use petalsync::sync::transport::StubChannel;
//! use petalsync::sync::{RecordType, SyncEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> petalsync::Result<()> {
//!     let config = CoreConfig::new().with_user_id("u-1");
//!
//!     let scheduler = ReminderScheduler::new(
//!         config.scheduler.clone(),
//!         Arc::new(LogNotifier),
//!         Arc::new(NullIntakeLogger),
//!     );
//!     scheduler
//!         .schedule(ReminderSpec {
//!             user_id: "u-1".into(),
//!             kind: ReminderKind::Pill,
//!             time_of_day: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
//!             style: ReminderStyle::Cute,
//!             recurring: true,
//!         })
//!         .await?;
//!
//!     let engine = SyncEngine::new(
//!         config.sync.clone(),
//!         config.device_id.clone(),
//!         "u-1",
//!         Arc::new(StubChannel::new()),
//!         PendingStore::open(&config.db_path)?,
//!     );
//!     engine.connect("u-1").await?;
//!     engine.sync_data(RecordType::Pill, serde_json::json!({"taken": true})).await?;
//!     Ok(())
//! }
//! ```

// Core modules
pub mod config;
pub mod error;
pub mod intake;
pub mod logging;
pub mod metrics;
pub mod notify;
pub mod reminder;
pub mod sync;

// Re-exports
pub use error::{PetalSyncError, Result};
