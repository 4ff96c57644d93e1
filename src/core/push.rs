//! Non-authoritative push channel.
//!
//! Push exists only to cut poll latency; clients must still treat `GET`
//! responses as the source of truth. This is formalized by giving the
//! channel its own tiny event type rather than letting it leak
//! `Case`/manifest internals — a push event carries just enough for a client
//! to decide "go re-fetch this case" or "re-fetch the list". Built on a
//! `tokio::sync::broadcast` channel fed to an `axum` SSE handler.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PushEvent {
    CaseAdded { case_id: String },
    CaseRemoved { case_id: String },
    CaseStatusChanged { case_id: String, status: String },
    FileStatusChanged {
        case_id: String,
        file_name: String,
        status: String,
    },
}

impl PushEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            PushEvent::CaseAdded { .. } => "case_added",
            PushEvent::CaseRemoved { .. } => "case_removed",
            PushEvent::CaseStatusChanged { .. } => "case_status_changed",
            PushEvent::FileStatusChanged { .. } => "file_status_changed",
        }
    }
}

const CHANNEL_CAPACITY: usize = 1024;

/// Thin wrapper around a broadcast sender. Cloning is cheap (an `Arc`
/// internally); every component that can cause a state transition holds one.
#[derive(Clone)]
pub struct PushChannel {
    sender: broadcast::Sender<PushEvent>,
}

impl PushChannel {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publishes an event. Must be called *after* the manifest append that
    /// caused the transition, never before, so a
    /// client reacting to the push and immediately GETing observes the new
    /// state. Lagging/absent subscribers are not an error — the channel is
    /// a hint, not a queue of record.
    pub fn publish(&self, event: PushEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.sender.subscribe()
    }
}

impl Default for PushChannel {
    fn default() -> Self {
        Self::new()
    }
}
