//! Playback engine adapter
//!
//! The queue treats audio output as an opaque collaborator with load/play/
//! busy/stop semantics. Completion is signalled through a `watch` channel so
//! the playback worker can await the end of a track without polling.
//!
//! Contract for implementations:
//! - `play()` raises busy before it returns
//! - busy falls when the track ends, fails, or is stopped
//! - `stop()` lowers busy before it returns

use crate::audio::decoder;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info};

/// Opaque audio output collaborator
pub trait PlaybackEngine: Send + Sync {
    /// Prepare a track for playback. Fails on unreadable or corrupt media.
    fn load(&self, path: &Path) -> Result<()>;

    /// Start the loaded track
    fn play(&self) -> Result<()>;

    fn is_busy(&self) -> bool;

    /// Stop the current track, if any
    fn stop(&self);

    /// Receiver following the busy flag
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Busy flag shared by an engine and its output thread
///
/// Each `start` opens a new generation; `finish` only lowers busy for the
/// generation that is still current, so a late completion from a stopped
/// track cannot end a newer one.
pub struct BusySignal {
    generation: Mutex<u64>,
    changed: Condvar,
    tx: watch::Sender<bool>,
}

impl BusySignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            generation: Mutex::new(0),
            changed: Condvar::new(),
            tx,
        }
    }

    /// Raise busy for a new generation and return it
    pub fn start(&self) -> u64 {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *generation += 1;
        self.tx.send_replace(true);
        self.changed.notify_all();
        *generation
    }

    /// Lower busy if `generation` is still current; returns whether it was
    pub fn finish(&self, generation: u64) -> bool {
        let current = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != generation {
            return false;
        }
        self.tx.send_replace(false);
        self.changed.notify_all();
        true
    }

    /// Invalidate the current generation and lower busy
    pub fn cancel(&self) {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *generation += 1;
        self.tx.send_replace(false);
        self.changed.notify_all();
    }

    /// Block while `generation` is current and busy, up to `timeout`.
    ///
    /// Returns true if the wait ran out with the generation still playing.
    pub fn wait_while_playing(&self, generation: u64, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut current = self.generation.lock().unwrap_or_else(PoisonError::into_inner);

        loop {
            if *current != generation || !*self.tx.borrow() {
                return false;
            }

            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return true;
                    }
                    current = self
                        .changed
                        .wait_timeout(current, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                None => {
                    current = self
                        .changed
                        .wait(current)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    /// True while `generation` has been neither finished nor cancelled
    pub fn is_current(&self, generation: u64) -> bool {
        let current = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *current == generation && *self.tx.borrow()
    }

    pub fn is_busy(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for BusySignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Track prepared by `load`
struct LoadedTrack {
    path: PathBuf,
    duration: Duration,
}

/// Engine for hosts without audio output
///
/// Probes each track's duration on `load` and holds busy for that long on a
/// helper thread. `stop` interrupts the wait immediately.
pub struct HeadlessEngine {
    loaded: Mutex<Option<LoadedTrack>>,
    busy: Arc<BusySignal>,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self {
            loaded: Mutex::new(None),
            busy: Arc::new(BusySignal::new()),
        }
    }
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackEngine for HeadlessEngine {
    fn load(&self, path: &Path) -> Result<()> {
        let duration = decoder::probe_duration(path)?;
        debug!("Headless engine loaded {} ({:.1}s)", path.display(), duration.as_secs_f64());
        *self.loaded.lock().unwrap_or_else(PoisonError::into_inner) = Some(LoadedTrack {
            path: path.to_path_buf(),
            duration,
        });
        Ok(())
    }

    fn play(&self) -> Result<()> {
        let track = self
            .loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| Error::Playback("No track loaded".to_string()))?;

        let generation = self.busy.start();
        let busy = Arc::clone(&self.busy);

        std::thread::Builder::new()
            .name("rockola-headless".to_string())
            .spawn(move || {
                if busy.wait_while_playing(generation, Some(track.duration)) {
                    busy.finish(generation);
                    debug!("Headless playback finished: {}", track.path.display());
                }
            })
            .map_err(|e| {
                self.busy.cancel();
                Error::Playback(format!("Failed to spawn playback thread: {}", e))
            })?;

        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    fn stop(&self) {
        if self.busy.is_busy() {
            info!("Stopping headless playback");
        }
        self.busy.cancel();
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.busy.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, frames: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn stale_generation_cannot_lower_busy() {
        let signal = BusySignal::new();
        let first = signal.start();
        signal.cancel();
        let second = signal.start();

        assert!(!signal.finish(first));
        assert!(!signal.is_current(first));
        assert!(signal.is_current(second));
        assert!(signal.is_busy());
        assert!(signal.finish(second));
        assert!(!signal.is_busy());
    }

    #[test]
    fn wait_times_out_while_playing() {
        let signal = BusySignal::new();
        let generation = signal.start();
        assert!(signal.wait_while_playing(generation, Some(Duration::from_millis(20))));
    }

    #[test]
    fn wait_returns_early_on_cancel() {
        let signal = Arc::new(BusySignal::new());
        let generation = signal.start();

        let canceller = Arc::clone(&signal);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });

        let started = Instant::now();
        assert!(!signal.wait_while_playing(generation, Some(Duration::from_secs(10))));
        assert!(started.elapsed() < Duration::from_secs(5));
        handle.join().unwrap();
    }

    #[test]
    fn play_without_load_fails() {
        let engine = HeadlessEngine::new();
        assert!(matches!(engine.play(), Err(Error::Playback(_))));
        assert!(!engine.is_busy());
    }

    #[test]
    fn corrupt_media_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.wav");
        std::fs::write(&path, b"RIFF garbage").unwrap();

        let engine = HeadlessEngine::new();
        assert!(engine.load(&path).is_err());
    }

    #[tokio::test]
    async fn headless_playback_runs_for_track_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_wav(&path, 400); // 50 ms

        let engine = HeadlessEngine::new();
        engine.load(&path).unwrap();
        engine.play().unwrap();
        assert!(engine.is_busy());

        let mut rx = engine.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|busy| !*busy))
            .await
            .expect("playback should finish")
            .unwrap();
        assert!(!engine.is_busy());
    }

    #[tokio::test]
    async fn stop_lowers_busy_before_returning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        write_wav(&path, 8000 * 30); // 30 s

        let engine = HeadlessEngine::new();
        engine.load(&path).unwrap();
        engine.play().unwrap();
        assert!(engine.is_busy());

        engine.stop();
        assert!(!engine.is_busy());
        assert!(!*engine.subscribe().borrow());
    }
}
