//! Queue, playback worker and engine adapter

pub mod engine;
pub mod queue_store;
pub mod worker;

pub use engine::{BusySignal, HeadlessEngine, PlaybackEngine};
pub use queue_store::{parse_position, pending_index, QueueSnapshot, QueueStore, RemovedFrom};
pub use worker::PlaybackWorker;
