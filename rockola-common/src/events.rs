//! Event types for the rockola event system
//!
//! Queue mutations and playback transitions are published as [`QueueEvent`]s
//! through an [`EventBus`] and streamed to browsers over SSE.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Queue and playback events
///
/// Serialized with a `type` tag so SSE clients can dispatch on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QueueEvent {
    /// The combined queue view changed
    QueueChanged {
        /// `[now_playing?] ++ pending` after the change
        queue: Vec<String>,
        /// What caused the change
        trigger: QueueChangeTrigger,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The playback worker handed a track to the engine
    TrackStarted {
        song: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track left the engine
    TrackFinished {
        song: String,
        outcome: PlaybackOutcome,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl QueueEvent {
    /// Name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            QueueEvent::QueueChanged { .. } => "QueueChanged",
            QueueEvent::TrackStarted { .. } => "TrackStarted",
            QueueEvent::TrackFinished { .. } => "TrackFinished",
        }
    }
}

/// Why the queue changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum QueueChangeTrigger {
    UserEnqueue,
    UserRemove,
    UserMove,
    PlaybackStarted,
    PlaybackFinished,
}

impl std::fmt::Display for QueueChangeTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueChangeTrigger::UserEnqueue => write!(f, "UserEnqueue"),
            QueueChangeTrigger::UserRemove => write!(f, "UserRemove"),
            QueueChangeTrigger::UserMove => write!(f, "UserMove"),
            QueueChangeTrigger::PlaybackStarted => write!(f, "PlaybackStarted"),
            QueueChangeTrigger::PlaybackFinished => write!(f, "PlaybackFinished"),
        }
    }
}

/// How a track left the playback engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PlaybackOutcome {
    /// Played to the end
    Completed,
    /// Stopped by a removal request or shutdown
    Stopped,
    /// The engine failed to load or render the track
    Failed,
}

impl std::fmt::Display for PlaybackOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackOutcome::Completed => write!(f, "Completed"),
            PlaybackOutcome::Stopped => write!(f, "Stopped"),
            PlaybackOutcome::Failed => write!(f, "Failed"),
        }
    }
}

/// Central event distribution bus
///
/// Wraps a `tokio::sync::broadcast` channel: publishing never blocks, slow
/// subscribers observe `Lagged` instead of holding producers back, and
/// receivers clean up when dropped.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring the case where nobody is listening
    pub fn emit_lossy(&self, event: QueueEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
