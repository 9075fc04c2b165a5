//! Session lifecycle event bus
//!
//! Broadcasts connection-manager events to UI subscribers (status captions,
//! play/stop affordances, fallback prompts). Events are fire-and-forget
//! notifications; with no subscribers they are silently dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::session::ConnectionState;

/// Event channel capacity (ring buffer size)
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Session lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Connection state transition
    StateChanged {
        camera_id: String,
        state: ConnectionState,
        at: DateTime<Utc>,
    },
    /// First media track arrived and was handed to the render target
    Connected { camera_id: String },
    /// A retry was scheduled after a recoverable failure
    RetryScheduled {
        camera_id: String,
        attempt: u32,
        delay_ms: u64,
    },
    /// Retries exhausted; the session ended in `failed`.
    /// `fallback_url` carries the image-poll feed when that transport is
    /// enabled; switching to it is the UI's decision.
    Failed {
        camera_id: String,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        fallback_url: Option<String>,
    },
    /// Session was closed by an explicit stop or bulk teardown
    Closed { camera_id: String },
}

impl SessionEvent {
    pub fn camera_id(&self) -> &str {
        match self {
            SessionEvent::StateChanged { camera_id, .. }
            | SessionEvent::Connected { camera_id }
            | SessionEvent::RetryScheduled { camera_id, .. }
            | SessionEvent::Failed { camera_id, .. }
            | SessionEvent::Closed { camera_id } => camera_id,
        }
    }
}

/// Broadcast bus for session events
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: SessionEvent) {
        // If no subscribers, send returns Err which is normal
        let _ = self.tx.send(event);
    }

    /// Subscribe to events
    ///
    /// The receiver uses a ring buffer; a subscriber that falls too far
    /// behind gets a `Lagged` error and misses events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
