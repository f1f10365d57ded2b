//! Push channel transport abstraction
//!
//! The engine talks to the remote side through [`PushChannel`]: a
//! connect/disconnect lifecycle, acknowledged emit, and an inbound event
//! subscription. The in-crate [`StubChannel`] backs the demo
//! binary and the test suite; a real bidirectional socket implementation
//! swaps in behind the same trait without touching engine logic.

use super::SyncRecord;
use crate::{PetalSyncError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

/// Outbound events understood by the remote side
pub const EVENT_SYNC_RECORD: &str = "sync-record";
pub const EVENT_REQUEST_FULL_SYNC: &str = "request-full-sync";

/// Remote acknowledgment of an acknowledged emit
#[derive(Debug, Clone)]
pub struct Ack {
    pub ok: bool,

    /// Response payload, when the exchange carries one (full-sync)
    pub payload: Option<serde_json::Value>,
}

/// Inbound events surfaced to the engine
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// A record originated on another device (or echoed back)
    Record(SyncRecord),

    /// Authoritative full-record set pushed by the remote side
    FullSync(Vec<SyncRecord>),

    /// Transport-level session loss
    ConnectionLost,

    /// Remote-reported sync error
    SyncError(String),

    /// Keepalive
    Ping,
}

/// Bidirectional transport session
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Open a session for the given user. Implementations must be safe to
    /// call again after a disconnect.
    async fn connect(&self, user_id: &str) -> Result<()>;

    /// Close the session; inbound subscriptions stay valid for reconnects.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Request/acknowledge exchange bounded by `timeout`
    async fn emit_with_ack(
        &self,
        event: &str,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> Result<Ack>;

    /// Subscribe to inbound events
    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent>;
}

/// Scripted response for the next acknowledged emit on the stub
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckBehavior {
    /// Acknowledge normally
    Ok,
    /// Explicit failure ack
    Fail,
    /// No ack within the timeout
    Timeout,
}

#[derive(Default)]
struct StubState {
    /// Connects to fail before succeeding (reconnect tests)
    failing_connects: u32,

    /// Scripted responses, consumed front-to-back; empty means Ok
    ack_script: VecDeque<AckBehavior>,

    /// Everything emitted, for assertions
    sent: Vec<(String, serde_json::Value)>,

    /// Records returned to a full-sync request
    full_sync_records: Vec<SyncRecord>,
}

/// In-memory push channel
///
/// Scriptable ack behavior and record injection make it the harness for
/// engine tests; the demo binary runs against it as a loopback.
pub struct StubChannel {
    connected: AtomicBool,
    state: Mutex<StubState>,
    events: broadcast::Sender<ChannelEvent>,
}

impl Default for StubChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl StubChannel {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            connected: AtomicBool::new(false),
            state: Mutex::new(StubState::default()),
            events,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        // Lock poisoning only happens if a panicking thread held it; recover
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail the next `n` connect calls with a transport error
    pub fn fail_next_connects(&self, n: u32) {
        self.lock().failing_connects = n;
    }

    /// Queue a scripted response for upcoming acknowledged emits
    pub fn script_ack(&self, behavior: AckBehavior) {
        self.lock().ack_script.push_back(behavior);
    }

    /// Set the record set returned for full-sync requests
    pub fn set_full_sync_records(&self, records: Vec<SyncRecord>) {
        self.lock().full_sync_records = records;
    }

    /// Deliver an inbound record as if another device pushed it
    pub fn inject_record(&self, record: SyncRecord) {
        let _ = self.events.send(ChannelEvent::Record(record));
    }

    /// Simulate a transport-level session loss
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events.send(ChannelEvent::ConnectionLost);
    }

    /// Count of emits for a given event name
    pub fn sent_count(&self, event: &str) -> usize {
        self.lock().sent.iter().filter(|(e, _)| e == event).count()
    }
}

#[async_trait]
impl PushChannel for StubChannel {
    async fn connect(&self, user_id: &str) -> Result<()> {
        {
            let mut state = self.lock();
            if state.failing_connects > 0 {
                state.failing_connects -= 1;
                return Err(PetalSyncError::Transport(format!(
                    "stub refused connect for {}",
                    user_id
                )));
            }
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn emit_with_ack(
        &self,
        event: &str,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> Result<Ack> {
        if !self.is_connected() {
            return Err(PetalSyncError::NotConnected);
        }

        let (behavior, full_sync) = {
            let mut state = self.lock();
            state.sent.push((event.to_string(), payload));
            let behavior = state.ack_script.pop_front().unwrap_or(AckBehavior::Ok);
            let full_sync = if event == EVENT_REQUEST_FULL_SYNC {
                Some(state.full_sync_records.clone())
            } else {
                None
            };
            (behavior, full_sync)
        };

        match behavior {
            AckBehavior::Ok => Ok(Ack {
                ok: true,
                payload: match full_sync {
                    Some(records) => Some(serde_json::to_value(records)?),
                    None => None,
                },
            }),
            AckBehavior::Fail => Ok(Ack {
                ok: false,
                payload: None,
            }),
            AckBehavior::Timeout => Err(PetalSyncError::AckTimeout(timeout)),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }
}
