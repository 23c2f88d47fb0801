//! Error types for rockola-player
//!
//! Client-facing variants map onto HTTP statuses in [`IntoResponse`]; the
//! playback variants never reach clients because the worker recovers from them.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Main error type for rockola-player
#[derive(Error, Debug)]
pub enum Error {
    /// Track absent from the storage root
    #[error("Song not found: {0}")]
    NotFound(String),

    /// Remove/move target is neither pending nor playing
    #[error("Song not in queue: {0}")]
    NotInQueue(String),

    /// Position value that is not an integer
    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    /// Missing or malformed request field
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Playback engine failure
    #[error("Playback error: {0}")]
    Playback(String),

    /// Audio probing/decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using rockola-player Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status reported to clients for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) | Error::NotInQueue(_) => StatusCode::NOT_FOUND,
            Error::InvalidPosition(_) | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_taxonomy_statuses() {
        assert_eq!(Error::NotFound("a.mp3".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(Error::NotInQueue("a.mp3".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(Error::InvalidPosition("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::BadRequest("song".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::Playback("device gone".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
