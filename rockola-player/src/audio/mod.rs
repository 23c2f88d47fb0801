//! Audio probing, decoding and device output

pub mod decoder;

#[cfg(feature = "cpal-output")]
pub mod output;
