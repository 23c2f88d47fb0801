//! Playback worker
//!
//! Single long-lived task that pulls the head of the queue, hands it to the
//! engine and waits for the engine to go idle. Engine failures are logged
//! and treated as the end of the track; the loop only ends on shutdown.

use crate::playback::queue_store::QueueStore;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub struct PlaybackWorker {
    store: Arc<QueueStore>,
}

impl PlaybackWorker {
    pub fn new(store: Arc<QueueStore>) -> Self {
        Self { store }
    }

    /// Run the loop on a tokio task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) {
        info!("Playback worker started");

        while let Some(track) = self.store.dequeue().await {
            let Some(path) = self.store.library().resolve(&track) else {
                self.store.skip_missing(&track);
                continue;
            };

            let mut busy = match self.store.begin_playback(&track, &path) {
                Ok(busy) => busy,
                Err(e) => {
                    error!("Playback of {} failed: {}", track, e);
                    continue;
                }
            };

            // Sender lives in the engine; an error means it is gone, which also ends the track
            if busy.wait_for(|playing| !*playing).await.is_err() {
                debug!("Engine busy channel closed during {}", track);
            }

            self.store.finish_playback(&track);
        }

        info!("Playback worker stopped");
    }
}
