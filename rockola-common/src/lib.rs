//! # Rockola Common Library
//!
//! Shared code for the rockola jukebox crates:
//! - Bootstrap configuration loading and resolution
//! - Queue event types and the broadcast EventBus
//! - Common error types

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
