//! HTTP request handlers
//!
//! Library listing and queue control endpoints.

use crate::api::AppState;
use crate::error::{Error, Result};
use crate::library::TrackId;
use crate::playback::parse_position;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

impl StatusResponse {
    fn new(status: &str) -> Json<Self> {
        Json(Self {
            status: status.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    song: Option<String>,
    /// 1-based position where 1 is the playing slot; null means append
    position: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    song: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    song: Option<String>,
    position: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct DurationResponse {
    /// Seconds; tracks whose length cannot be probed count as zero
    total_duration: f64,
}

/// Unwrap a JSON body, reporting malformed input as a client error
fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| Error::BadRequest(rejection.body_text()))
}

/// Treat empty strings like absent fields
fn non_empty(song: Option<String>) -> Option<String> {
    song.filter(|s| !s.is_empty())
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "rockola-player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Library Endpoints
// ============================================================================

/// GET /api/songs - all playable tracks in traversal order
pub async fn list_songs(State(state): State<AppState>) -> Result<Json<Vec<TrackId>>> {
    let library = state.library.clone();
    let songs = tokio::task::spawn_blocking(move || library.list())
        .await
        .map_err(|e| Error::Internal(format!("Library scan failed: {}", e)))?;

    debug!("Listing {} songs", songs.len());
    Ok(Json(songs))
}

// ============================================================================
// Queue Endpoints
// ============================================================================

/// GET /api/queue - `[now_playing?] ++ pending`
pub async fn get_queue(State(state): State<AppState>) -> Json<Vec<TrackId>> {
    Json(state.store.snapshot().combined())
}

/// POST /api/queue - enqueue a track, optionally at a position
///
/// A missing `song` is reported like an unknown one (404).
pub async fn enqueue(
    State(state): State<AppState>,
    payload: std::result::Result<Json<EnqueueRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StatusResponse>)> {
    let request = json_body(payload)?;

    let song = non_empty(request.song)
        .ok_or_else(|| Error::NotFound("no song given".to_string()))?;
    let position = match request.position {
        Some(value) => Some(parse_position(&value)?),
        None => None,
    };

    state.store.enqueue(TrackId::from(song), position)?;
    Ok((StatusCode::CREATED, StatusResponse::new("ok")))
}

/// DELETE /api/queue - remove a pending track or stop the playing one
pub async fn remove_from_queue(
    State(state): State<AppState>,
    payload: std::result::Result<Json<RemoveRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>> {
    let request = json_body(payload)?;
    let song = non_empty(request.song)
        .ok_or_else(|| Error::BadRequest("No song specified".to_string()))?;

    let store = state.store.clone();
    let track = TrackId::from(song);
    // Stopping the engine may block briefly on the output thread
    tokio::task::spawn_blocking(move || store.remove(&track))
        .await
        .map_err(|e| Error::Internal(format!("Remove task failed: {}", e)))??;

    Ok(StatusResponse::new("removed"))
}

/// POST /api/queue/move - move a pending track to a position
pub async fn move_in_queue(
    State(state): State<AppState>,
    payload: std::result::Result<Json<MoveRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>> {
    let request = json_body(payload)?;

    let (Some(song), Some(position)) = (non_empty(request.song), request.position) else {
        return Err(Error::BadRequest("song and position are required".to_string()));
    };
    let position = parse_position(&position)?;

    state.store.move_track(&TrackId::from(song), position)?;
    Ok(StatusResponse::new("moved"))
}

/// GET /api/queue/duration - approximate total length of the queue
pub async fn queue_duration(State(state): State<AppState>) -> Result<Json<DurationResponse>> {
    let tracks = state.store.snapshot().combined();
    let library = state.library.clone();

    let total = tokio::task::spawn_blocking(move || {
        tracks
            .iter()
            .filter_map(|track| library.duration(track))
            .sum::<Duration>()
    })
    .await
    .map_err(|e| Error::Internal(format!("Duration probe failed: {}", e)))?;

    Ok(Json(DurationResponse {
        total_duration: total.as_secs_f64(),
    }))
}
