//! # Rockola Player Library (rockola-player)
//!
//! Shared music queue for a single audio output, driven over HTTP.
//!
//! **Purpose:** Index the playable files under a storage root, keep an ordered
//! queue of requested tracks, and play them one at a time through a playback
//! engine, with a JSON/SSE control surface.
//!
//! **Architecture:** axum handlers and one playback worker task share a
//! [`playback::QueueStore`]; audio goes through a [`playback::PlaybackEngine`]
//! (headless timer by default, cpal with the `cpal-output` feature).

pub mod api;
pub mod audio;
pub mod error;
pub mod library;
pub mod playback;

pub use error::{Error, Result};
pub use library::{LibraryIndex, TrackId};
