//! Cross-device sync engine
//!
//! Owns the single transport session, the durable outbound queue, inbound
//! record application, and reconnection backoff. Local writes are queued
//! durably and delivered at-least-once; inbound records are applied through
//! per-category handlers, except records originated by this device, which are
//! always discarded to prevent an echo loop. Nothing here is fatal to the
//! host process: failures degrade to queued-for-retry or a status change.

use super::backoff::ReconnectPolicy;
use super::handlers::{ApplierRegistry, ApplyOutcome, RecordApplier};
use super::store::PendingStore;
use super::transport::{ChannelEvent, PushChannel, EVENT_REQUEST_FULL_SYNC, EVENT_SYNC_RECORD};
use super::{ConnectionStatus, DiscardReason, RecordKey, RecordType, SyncEvent, SyncRecord};
use crate::config::SyncConfig;
use crate::{metrics, PetalSyncError, Result};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

struct EngineState {
    user_id: String,
    queue: VecDeque<SyncRecord>,
    store: PendingStore,
    appliers: ApplierRegistry,
    connected: bool,
    sync_in_progress: bool,
    last_sync: Option<DateTime<Utc>>,
    reconnect_attempts: u32,
    listener: Option<JoinHandle<()>>,
    reconnect_task: Option<JoinHandle<()>>,
}

/// Sync engine
///
/// Cheap to clone; all clones share one session and one queue. Only one
/// transport session is active per process: connecting again tears down the
/// previous session first.
#[derive(Clone)]
pub struct SyncEngine {
    config: SyncConfig,
    device_id: String,
    channel: Arc<dyn PushChannel>,
    inner: Arc<Mutex<EngineState>>,
    status_tx: Arc<watch::Sender<ConnectionStatus>>,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncEngine {
    /// Create an engine over a transport and a durable store.
    ///
    /// Records persisted by a previous process are reloaded into the
    /// in-memory queue so they are retried on the next online cycle.
    pub fn new(
        config: SyncConfig,
        device_id: impl Into<String>,
        user_id: impl Into<String>,
        channel: Arc<dyn PushChannel>,
        store: PendingStore,
    ) -> Self {
        let queue: VecDeque<SyncRecord> = match store.load_all() {
            Ok(records) => records.into(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to reload pending records; starting empty");
                VecDeque::new()
            }
        };
        metrics::set_pending_records(queue.len() as i64);

        let (status_tx, _) = watch::channel(ConnectionStatus {
            pending_change_count: queue.len(),
            ..Default::default()
        });
        let (events, _) = broadcast::channel(256);

        Self {
            config,
            device_id: device_id.into(),
            channel,
            inner: Arc::new(Mutex::new(EngineState {
                user_id: user_id.into(),
                queue,
                store,
                appliers: ApplierRegistry::new(),
                connected: false,
                sync_in_progress: false,
                last_sync: None,
                reconnect_attempts: 0,
                listener: None,
                reconnect_task: None,
            })),
            status_tx: Arc::new(status_tx),
            events,
        }
    }

    /// Register the applier for a domain category
    pub async fn register_applier(&self, record_type: RecordType, applier: Arc<dyn RecordApplier>) {
        self.inner.lock().await.appliers.register(record_type, applier);
    }

    /// Current status snapshot
    pub fn status(&self) -> ConnectionStatus {
        self.status_tx.borrow().clone()
    }

    /// Watch status transitions; receivers always see the latest snapshot
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Open a transport session, tearing down any existing one, then drain
    /// the queued records.
    pub async fn connect(&self, user_id: &str) -> Result<()> {
        {
            let mut state = self.inner.lock().await;
            state.user_id = user_id.to_string();
            if let Some(handle) = state.listener.take() {
                handle.abort();
            }
        }
        self.channel.disconnect().await;
        self.channel.connect(user_id).await?;

        {
            let mut state = self.inner.lock().await;
            state.connected = true;
            state.reconnect_attempts = 0;
            state.listener = Some(self.spawn_listener());
            self.publish_status(&state);
        }

        metrics::set_connected(true);
        tracing::info!(user = %user_id, device = %self.device_id, "Sync session established");
        self.publish(SyncEvent::Connected);

        self.drain().await;
        Ok(())
    }

    /// Close the session. The queue is kept; an in-flight send is allowed to
    /// settle on its own.
    pub async fn disconnect(&self) {
        {
            let mut state = self.inner.lock().await;
            if let Some(handle) = state.listener.take() {
                handle.abort();
            }
            if let Some(handle) = state.reconnect_task.take() {
                handle.abort();
            }
            state.connected = false;
            self.publish_status(&state);
        }
        self.channel.disconnect().await;

        metrics::set_connected(false);
        tracing::info!("Sync session closed");
        self.publish(SyncEvent::Disconnected);
    }

    /// Queue a local domain write for propagation and attempt an immediate
    /// send when connected.
    ///
    /// The record is persisted to the durable store before any delivery
    /// attempt; it is removed only after a remote acknowledgment.
    pub async fn sync_data(
        &self,
        record_type: RecordType,
        payload: serde_json::Value,
    ) -> Result<RecordKey> {
        let mut state = self.inner.lock().await;
        let record = SyncRecord::local_write(
            state.user_id.clone(),
            record_type,
            payload,
            self.device_id.clone(),
        );
        let key = record.key();

        if let Err(e) = state.store.append(&record) {
            // Best-effort persistence: the in-memory queue still carries it
            tracing::warn!(error = %e, "Failed to persist pending record");
        }
        state.queue.push_back(record);
        self.publish_status(&state);
        let connected = state.connected;
        drop(state);

        self.publish(SyncEvent::RecordQueued { key: key.clone() });
        tracing::debug!(record_type = %record_type, "Queued local write");

        if connected {
            self.drain().await;
        }
        Ok(key)
    }

    /// Attempt delivery of every record queued at the start of the cycle, in
    /// queue order.
    ///
    /// Each record gets exactly one attempt per cycle. A transient failure
    /// rotates the record to the back of the queue for the next opportunity,
    /// so one rejected record cannot starve the rest; a non-retryable failure
    /// drops the record. Reentrant calls while a drain is running are no-ops.
    pub async fn drain(&self) {
        let cycle_len = {
            let mut state = self.inner.lock().await;
            if !state.connected || state.sync_in_progress {
                return;
            }
            state.sync_in_progress = true;
            self.publish_status(&state);
            state.queue.len()
        };

        for _ in 0..cycle_len {
            let record = {
                let state = self.inner.lock().await;
                match state.queue.front() {
                    Some(record) => record.clone(),
                    None => break,
                }
            };

            let sent = self.send_record(&record).await;

            let mut state = self.inner.lock().await;
            match sent {
                Ok(()) => {
                    state.queue.pop_front();
                    let key = record.key();
                    if let Err(e) = state.store.remove(&key) {
                        tracing::warn!(error = %e, "Failed to remove acked record from store");
                    }
                    state.last_sync = Some(Utc::now());
                    self.publish_status(&state);
                    metrics::record_ack();
                    self.publish(SyncEvent::RecordAcked { key });
                }
                Err(e) if e.is_retryable() => {
                    tracing::debug!(error = %e, "Send failed; record stays queued");
                    metrics::record_send_failure(if matches!(e, PetalSyncError::AckTimeout(_)) {
                        "timeout"
                    } else {
                        "transport"
                    });
                    self.publish(SyncEvent::Error {
                        message: format!("Send failed: {}", e),
                    });
                    state.queue.rotate_left(1);
                }
                Err(e) => {
                    // Retrying cannot fix this record
                    tracing::warn!(error = %e, "Dropping undeliverable record");
                    state.queue.pop_front();
                    let key = record.key();
                    if let Err(remove_err) = state.store.remove(&key) {
                        tracing::warn!(error = %remove_err, "Failed to remove dropped record from store");
                    }
                    self.publish_status(&state);
                    metrics::record_send_failure("fatal");
                    self.publish(SyncEvent::Error {
                        message: format!("Dropped undeliverable record: {}", e),
                    });
                }
            }
        }

        let mut state = self.inner.lock().await;
        state.sync_in_progress = false;
        self.publish_status(&state);
    }

    /// Resend everything queued, then fetch and apply the authoritative
    /// full-record set from the remote side.
    pub async fn force_full_sync(&self) -> Result<usize> {
        self.drain().await;

        let user_id = self.inner.lock().await.user_id.clone();
        let ack = self
            .channel
            .emit_with_ack(
                EVENT_REQUEST_FULL_SYNC,
                serde_json::json!({ "userId": user_id }),
                self.config.ack_timeout(),
            )
            .await?;

        if !ack.ok {
            return Err(PetalSyncError::Transport(
                "Full-sync request rejected".to_string(),
            ));
        }

        let records: Vec<SyncRecord> = match ack.payload {
            Some(payload) => serde_json::from_value(payload)?,
            None => Vec::new(),
        };

        let mut applied = 0;
        for record in &records {
            if self.apply_inbound(record).await {
                applied += 1;
            }
        }

        {
            let mut state = self.inner.lock().await;
            state.last_sync = Some(Utc::now());
            self.publish_status(&state);
        }

        tracing::info!(received = records.len(), applied, "Full sync completed");
        self.publish(SyncEvent::FullSyncCompleted { applied });
        Ok(applied)
    }

    /// Platform signal: connectivity came back. Resets the backoff cycle and
    /// attempts an immediate reconnect.
    pub async fn connectivity_restored(&self) {
        let user_id = {
            let mut state = self.inner.lock().await;
            state.reconnect_attempts = 0;
            if let Some(handle) = state.reconnect_task.take() {
                handle.abort();
            }
            state.user_id.clone()
        };

        tracing::info!("Connectivity restored; reconnecting");
        if let Err(e) = self.connect(&user_id).await {
            tracing::warn!(error = %e, "Reconnect on connectivity-restored failed");
            let mut state = self.inner.lock().await;
            self.start_reconnect(&mut state);
        }
    }

    /// Platform signal: connectivity lost. Goes offline without clearing the
    /// queue or aborting an in-flight send.
    pub async fn connectivity_lost(&self) {
        let mut state = self.inner.lock().await;
        state.connected = false;
        self.publish_status(&state);
        drop(state);

        metrics::set_connected(false);
        tracing::info!("Connectivity lost");
        self.publish(SyncEvent::Disconnected);
    }

    /// Deliver one record and interpret the acknowledgment
    async fn send_record(&self, record: &SyncRecord) -> Result<()> {
        let payload = serde_json::to_value(record)?;
        let ack = self
            .channel
            .emit_with_ack(EVENT_SYNC_RECORD, payload, self.config.ack_timeout())
            .await?;
        if ack.ok {
            Ok(())
        } else {
            Err(PetalSyncError::Transport("Remote rejected record".to_string()))
        }
    }

    /// Apply one inbound record; returns whether it was applied
    async fn apply_inbound(&self, record: &SyncRecord) -> bool {
        let key = record.key();

        // Echo guard: never re-apply a record this device originated
        if record.origin_device_id == self.device_id {
            tracing::debug!(device = %self.device_id, "Discarding echoed record");
            self.publish(SyncEvent::RecordDiscarded {
                key,
                reason: DiscardReason::Echo,
            });
            return false;
        }

        let mut state = self.inner.lock().await;
        match state.appliers.offer(record).await {
            Ok(ApplyOutcome::Applied) => {
                state.last_sync = Some(Utc::now());
                self.publish_status(&state);
                drop(state);
                metrics::record_applied(record.record_type.as_str());
                self.publish(SyncEvent::RecordApplied { key });
                true
            }
            Ok(ApplyOutcome::Discarded(reason)) => {
                drop(state);
                self.publish(SyncEvent::RecordDiscarded { key, reason });
                false
            }
            Err(e) => {
                drop(state);
                tracing::warn!(error = %e, "Applier failed");
                self.publish(SyncEvent::Error {
                    message: format!("Apply failed: {}", e),
                });
                false
            }
        }
    }

    /// Listener over inbound channel events for the lifetime of one session
    fn spawn_listener(&self) -> JoinHandle<()> {
        let engine = self.clone();
        let mut rx = self.channel.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => engine.handle_channel_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Inbound event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn handle_channel_event(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::Record(record) => {
                self.apply_inbound(&record).await;
            }
            ChannelEvent::FullSync(records) => {
                let mut applied = 0;
                for record in &records {
                    if self.apply_inbound(record).await {
                        applied += 1;
                    }
                }
                self.publish(SyncEvent::FullSyncCompleted { applied });
            }
            ChannelEvent::ConnectionLost => {
                let mut state = self.inner.lock().await;
                state.connected = false;
                self.publish_status(&state);
                self.start_reconnect(&mut state);
                drop(state);

                metrics::set_connected(false);
                tracing::warn!("Transport session lost");
                self.publish(SyncEvent::Disconnected);
            }
            ChannelEvent::SyncError(message) => {
                tracing::warn!(%message, "Remote sync error");
                self.publish(SyncEvent::Error { message });
            }
            ChannelEvent::Ping => {
                tracing::trace!("keepalive");
            }
        }
    }

    /// Start (or restart) the backoff-driven reconnect task.
    ///
    /// The handle stays registered in `reconnect_task` for the task's whole
    /// life so disconnect and connectivity_restored can abort it at any
    /// point in the cycle; connect never touches that slot.
    fn start_reconnect(&self, state: &mut EngineState) {
        if let Some(handle) = state.reconnect_task.take() {
            handle.abort();
        }

        let engine = self.clone();
        let policy: ReconnectPolicy = self.config.reconnect_policy();
        state.reconnect_task = Some(tokio::spawn(async move {
            loop {
                let (attempt, user_id) = {
                    let state = engine.inner.lock().await;
                    if state.connected {
                        return;
                    }
                    (state.reconnect_attempts, state.user_id.clone())
                };

                if !policy.allows(attempt) {
                    tracing::warn!(attempts = attempt, "Reconnect attempts exhausted");
                    engine.publish(SyncEvent::ReconnectGaveUp { attempts: attempt });
                    return;
                }

                let delay = policy.delay_for(attempt);
                engine.publish(SyncEvent::ReconnectScheduled {
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                });
                tokio::time::sleep(delay).await;

                engine.inner.lock().await.reconnect_attempts += 1;
                metrics::record_reconnect_attempt();

                match engine.connect(&user_id).await {
                    Ok(()) => return,
                    Err(e) => {
                        tracing::warn!(error = %e, attempt = attempt + 1, "Reconnect failed");
                    }
                }
            }
        }));
    }

    /// Recompute and broadcast the status snapshot
    fn publish_status(&self, state: &EngineState) {
        let status = ConnectionStatus {
            is_connected: state.connected,
            last_sync_timestamp: state.last_sync,
            pending_change_count: state.queue.len(),
            sync_in_progress: state.sync_in_progress,
        };
        metrics::set_pending_records(status.pending_change_count as i64);
        self.status_tx.send_replace(status);
    }

    fn publish(&self, event: SyncEvent) {
        // No receivers is fine; events are observability only
        let _ = self.events.send(event);
    }
}
