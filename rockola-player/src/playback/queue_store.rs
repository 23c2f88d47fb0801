//! Ordered queue store
//!
//! Holds the now-playing slot and the pending sequence behind one mutex so
//! every operation, including the snapshot read, sees both fields together.
//! The playback worker blocks in [`QueueStore::dequeue`] on a `Notify`
//! permit rather than polling.
//!
//! Positions are 1-based from the client's point of view and slot 1 is the
//! track that is currently playing, so positions 1 and 2 both land at the
//! front of `pending`.

use crate::error::{Error, Result};
use crate::library::{LibraryIndex, TrackId};
use crate::playback::engine::PlaybackEngine;
use rockola_common::events::{EventBus, PlaybackOutcome, QueueChangeTrigger, QueueEvent};
use serde_json::Value;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

/// Where a removed track was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovedFrom {
    Pending,
    /// The track was playing; the engine was stopped
    NowPlaying,
}

/// Point-in-time copy of the queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub now_playing: Option<TrackId>,
    pub pending: Vec<TrackId>,
}

impl QueueSnapshot {
    /// Client view: `[now_playing?] ++ pending`
    pub fn combined(&self) -> Vec<TrackId> {
        self.now_playing
            .iter()
            .chain(self.pending.iter())
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
struct QueueState {
    now_playing: Option<TrackId>,
    pending: VecDeque<TrackId>,
    /// Set by `shutdown`; `dequeue` returns `None` from then on
    shutdown: bool,
}

impl QueueState {
    fn combined_names(&self) -> Vec<String> {
        self.now_playing
            .iter()
            .chain(self.pending.iter())
            .map(|t| t.to_string())
            .collect()
    }

    fn position_of(&self, track: &TrackId) -> Option<usize> {
        self.pending.iter().position(|t| t == track)
    }
}

/// Pending index for a 1-based client position.
///
/// `clamp(position - 2, 0, len)`: slot 1 is the playing track, so positions
/// 1 and 2 both mean "front", and anything past the end appends.
pub fn pending_index(position: i64, len: usize) -> usize {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    // Bounded by `len`, which came from a usize
    position.saturating_sub(2).clamp(0, len) as usize
}

/// Parse a client-supplied position.
///
/// Accepts JSON integers, floats without a fractional part, and strings
/// holding an integer (surrounding whitespace ignored).
pub fn parse_position(value: &Value) -> Result<i64> {
    let invalid = || Error::InvalidPosition(value.to_string());

    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if n.as_u64().is_some() {
                Ok(i64::MAX)
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() && f.fract() == 0.0 => Ok(f as i64),
                    _ => Err(invalid()),
                }
            }
        }
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

/// Thread-safe queue shared by the HTTP handlers and the playback worker
pub struct QueueStore {
    state: Mutex<QueueState>,
    available: Notify,
    closed: watch::Sender<bool>,
    engine: Arc<dyn PlaybackEngine>,
    library: Arc<LibraryIndex>,
    events: EventBus,
}

impl QueueStore {
    pub fn new(engine: Arc<dyn PlaybackEngine>, library: Arc<LibraryIndex>, events: EventBus) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Notify::new(),
            closed: watch::channel(false).0,
            engine,
            library,
            events,
        }
    }

    pub fn library(&self) -> &Arc<LibraryIndex> {
        &self.library
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Every mutation leaves the state consistent before anything can panic
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn announce(&self, state: &QueueState, trigger: QueueChangeTrigger) {
        self.events.emit_lossy(QueueEvent::QueueChanged {
            queue: state.combined_names(),
            trigger,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Add a track to `pending`, at the tail or at a client position.
    ///
    /// Fails with `NotFound` when the track does not resolve in the library.
    pub fn enqueue(&self, track: TrackId, position: Option<i64>) -> Result<()> {
        if self.library.resolve(&track).is_none() {
            return Err(Error::NotFound(track.to_string()));
        }

        let mut state = self.lock();
        let index = match position {
            Some(position) => pending_index(position, state.pending.len()),
            None => state.pending.len(),
        };
        info!("Enqueued {} at pending index {}", track, index);
        state.pending.insert(index, track);
        self.announce(&state, QueueChangeTrigger::UserEnqueue);
        drop(state);

        self.available.notify_one();
        Ok(())
    }

    /// Wait for the head of `pending` and take it.
    ///
    /// Returns `None` once the store has been shut down, even if tracks are
    /// still pending. Only the playback worker calls this.
    pub async fn dequeue(&self) -> Option<TrackId> {
        loop {
            {
                let mut state = self.lock();
                if state.shutdown {
                    return None;
                }
                if let Some(track) = state.pending.pop_front() {
                    debug!("Dequeued {}", track);
                    return Some(track);
                }
            }
            self.available.notified().await;
        }
    }

    /// Remove the first pending occurrence of `track`, or stop it if it is
    /// the track playing now.
    pub fn remove(&self, track: &TrackId) -> Result<RemovedFrom> {
        let mut state = self.lock();

        let removed = if let Some(index) = state.position_of(track) {
            state.pending.remove(index);
            RemovedFrom::Pending
        } else if state.now_playing.as_ref() == Some(track) {
            // Stop returns with busy lowered, before the worker can observe completion
            self.engine.stop();
            state.now_playing = None;
            RemovedFrom::NowPlaying
        } else {
            return Err(Error::NotInQueue(track.to_string()));
        };

        info!("Removed {} ({:?})", track, removed);
        self.announce(&state, QueueChangeTrigger::UserRemove);
        Ok(removed)
    }

    /// Move the first pending occurrence of `track` to a client position.
    ///
    /// The index is computed on the length after removal. A track that is
    /// only playing, not pending, is `NotInQueue`.
    pub fn move_track(&self, track: &TrackId, position: i64) -> Result<()> {
        let mut state = self.lock();

        let from = state
            .position_of(track)
            .ok_or_else(|| Error::NotInQueue(track.to_string()))?;
        if let Some(moved) = state.pending.remove(from) {
            let to = pending_index(position, state.pending.len());
            state.pending.insert(to, moved);
            info!("Moved {} from pending index {} to {}", track, from, to);
        }

        self.announce(&state, QueueChangeTrigger::UserMove);
        Ok(())
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.lock();
        QueueSnapshot {
            now_playing: state.now_playing.clone(),
            pending: state.pending.iter().cloned().collect(),
        }
    }

    /// Publish `track` as now playing and start it on the engine.
    ///
    /// Load and play run under the store lock, so a concurrent `remove`
    /// sees either nothing playing or a track the engine is already
    /// rendering. Returns the engine's busy receiver to await completion.
    pub fn begin_playback(&self, track: &TrackId, path: &Path) -> Result<watch::Receiver<bool>> {
        let mut state = self.lock();
        if state.shutdown {
            return Err(Error::Playback("Queue is shutting down".to_string()));
        }

        let busy = self.engine.subscribe();
        if let Err(e) = self.engine.load(path).and_then(|_| self.engine.play()) {
            self.engine.stop();
            self.events.emit_lossy(QueueEvent::TrackFinished {
                song: track.to_string(),
                outcome: PlaybackOutcome::Failed,
                timestamp: chrono::Utc::now(),
            });
            self.announce(&state, QueueChangeTrigger::PlaybackFinished);
            return Err(e);
        }

        state.now_playing = Some(track.clone());
        info!("Now playing {}", track);
        self.events.emit_lossy(QueueEvent::TrackStarted {
            song: track.to_string(),
            timestamp: chrono::Utc::now(),
        });
        self.announce(&state, QueueChangeTrigger::PlaybackStarted);
        Ok(busy)
    }

    /// Clear now-playing after the engine went idle.
    ///
    /// `Completed` when the slot still named `track`; `Stopped` when a
    /// removal or shutdown cleared it first.
    pub fn finish_playback(&self, track: &TrackId) -> PlaybackOutcome {
        let mut state = self.lock();

        let outcome = if state.now_playing.as_ref() == Some(track) {
            state.now_playing = None;
            PlaybackOutcome::Completed
        } else {
            PlaybackOutcome::Stopped
        };

        info!("Finished {} ({})", track, outcome);
        self.events.emit_lossy(QueueEvent::TrackFinished {
            song: track.to_string(),
            outcome,
            timestamp: chrono::Utc::now(),
        });
        if outcome == PlaybackOutcome::Completed {
            self.announce(&state, QueueChangeTrigger::PlaybackFinished);
        }
        outcome
    }

    /// Record that a dequeued track no longer resolves and was dropped
    pub fn skip_missing(&self, track: &TrackId) {
        warn!("Skipping {}: file no longer exists", track);
        let state = self.lock();
        self.announce(&state, QueueChangeTrigger::PlaybackFinished);
    }

    /// Stop playback and end the worker loop.
    ///
    /// Takes effect ahead of any pending entries.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if state.shutdown {
            return;
        }
        state.shutdown = true;
        if let Some(track) = state.now_playing.take() {
            info!("Stopping {} for shutdown", track);
            self.engine.stop();
        }
        drop(state);

        self.closed.send_replace(true);
        self.available.notify_one();
    }

    /// Resolves once `shutdown` has been called
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives as long as `self`, so this cannot fail
        let _ = rx.wait_for(|closed| *closed).await;
    }
}
