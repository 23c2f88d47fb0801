//! Common error types for rockola

use thiserror::Error;

/// Common result type for rockola operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types shared by the rockola crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed TOML configuration file
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
}
