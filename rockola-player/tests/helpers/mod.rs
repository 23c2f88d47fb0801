//! Test helpers for rockola-player integration tests
//!
//! Provides:
//! - ManualEngine: playback engine whose tracks only end when told to
//! - TestLibrary: temporary storage root with audio files
//! - TestApp: queue store, router and event bus wired together
//! - Event waiting helpers

#![allow(dead_code)]

use rockola_common::config::{CliOverrides, Settings, TomlConfig};
use rockola_common::events::{EventBus, QueueEvent};
use rockola_player::api::{build_router, AppState};
use rockola_player::playback::{BusySignal, PlaybackEngine, QueueStore};
use rockola_player::{Error, LibraryIndex, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{broadcast, watch};

/// Engine that stays busy until `finish_current` or `stop`.
///
/// Files whose name contains "corrupt" fail to load.
#[derive(Default)]
pub struct ManualEngine {
    busy: BusySignal,
    generation: Mutex<u64>,
    stops: AtomicUsize,
    loads: Mutex<Vec<PathBuf>>,
}

impl ManualEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// End the current track as if it played to completion
    pub fn finish_current(&self) {
        let generation = *self.generation.lock().unwrap();
        self.busy.finish(generation);
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn loaded(&self) -> Vec<PathBuf> {
        self.loads.lock().unwrap().clone()
    }
}

impl PlaybackEngine for ManualEngine {
    fn load(&self, path: &Path) -> Result<()> {
        if path.to_string_lossy().contains("corrupt") {
            return Err(Error::Decode(format!("cannot decode {}", path.display())));
        }
        self.loads.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    fn play(&self) -> Result<()> {
        *self.generation.lock().unwrap() = self.busy.start();
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.busy.cancel();
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.busy.subscribe()
    }
}

/// Temporary storage root
pub struct TestLibrary {
    pub dir: TempDir,
}

impl TestLibrary {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Should create temp dir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Create an empty file (enough for resolution, not for probing)
    pub fn touch(&self, relative: &str) -> PathBuf {
        let path = self.root().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"").unwrap();
        path
    }

    /// Write a silent mono 8 kHz WAV of the given length
    pub fn wav(&self, relative: &str, millis: u32) -> PathBuf {
        let path = self.root().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..(8 * millis) {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    pub fn index(&self) -> Arc<LibraryIndex> {
        Arc::new(LibraryIndex::new(
            self.root(),
            vec!["mp3".to_string(), "wav".to_string()],
        ))
    }
}

/// Store, router and engine sharing one temporary library
pub struct TestApp {
    pub library: TestLibrary,
    pub engine: Arc<ManualEngine>,
    pub store: Arc<QueueStore>,
    pub settings: Arc<Settings>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_library(TestLibrary::new())
    }

    pub fn with_library(library: TestLibrary) -> Self {
        let engine = ManualEngine::new();
        Self::with_engine(library, engine)
    }

    pub fn with_engine(library: TestLibrary, engine: Arc<ManualEngine>) -> Self {
        let store = Arc::new(QueueStore::new(
            engine.clone(),
            library.index(),
            EventBus::new(256),
        ));

        let cli = CliOverrides {
            songs_folder: Some(library.root().to_path_buf()),
            ..Default::default()
        };
        let settings = Arc::new(Settings::resolve(cli, TomlConfig::default()).unwrap());

        Self {
            library,
            engine,
            store,
            settings,
        }
    }

    pub fn router(&self) -> axum::Router {
        build_router(AppState::new(Arc::clone(&self.store), Arc::clone(&self.settings)))
    }

    pub fn queue(&self) -> Vec<String> {
        self.store
            .snapshot()
            .combined()
            .into_iter()
            .map(|t| t.to_string())
            .collect()
    }
}

/// Wait up to two seconds for an event matching `pred`
pub async fn wait_for_event<F>(rx: &mut broadcast::Receiver<QueueEvent>, mut pred: F) -> QueueEvent
where
    F: FnMut(&QueueEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = rx.recv().await.expect("Event bus should stay open");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("Timed out waiting for event")
}

pub fn is_started(song: &str) -> impl FnMut(&QueueEvent) -> bool + '_ {
    move |event| matches!(event, QueueEvent::TrackStarted { song: s, .. } if s == song)
}

pub fn is_finished(song: &str) -> impl FnMut(&QueueEvent) -> bool + '_ {
    move |event| matches!(event, QueueEvent::TrackFinished { song: s, .. } if s == song)
}
