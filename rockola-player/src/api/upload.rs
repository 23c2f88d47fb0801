//! Track upload
//!
//! `POST /api/upload` accepts a multipart form with a `song` file field and
//! stores it under the upload subfolder of the storage root, where the
//! library index picks it up on the next listing.

use crate::api::AppState;
use crate::error::{Error, Result};
use crate::library::TrackId;
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Multipart field carrying the file
const FIELD_NAME: &str = "song";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    status: String,
    /// Identifier of the stored track, usable with `/api/queue`
    song: TrackId,
}

/// Reduce a client-supplied filename to a safe single path segment.
///
/// Directory components are dropped, characters outside `[A-Za-z0-9._-]`
/// become `_` and leading dots are removed. Returns `None` when nothing
/// usable remains.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

/// POST /api/upload
pub async fn upload_song(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::BadRequest(e.body_text()))?
    {
        if field.name() != Some(FIELD_NAME) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| Error::BadRequest(e.body_text()))?;
        upload = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) =
        upload.ok_or_else(|| Error::BadRequest(format!("No '{}' file in request", FIELD_NAME)))?;

    if file_name.is_empty() {
        return Err(Error::BadRequest("No file selected".to_string()));
    }
    let name = sanitize_filename(&file_name)
        .ok_or_else(|| Error::BadRequest(format!("Invalid filename: {}", file_name)))?;
    if !state.library.has_playable_extension(Path::new(&name)) {
        return Err(Error::BadRequest(format!(
            "File type not allowed, expected one of: {}",
            state.library.extensions().join(", ")
        )));
    }
    if bytes.is_empty() {
        return Err(Error::BadRequest("Uploaded file is empty".to_string()));
    }

    let subfolder = &state.settings.upload_subfolder;
    let dir = state.library.root().join(subfolder);
    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(dir.join(&name), &bytes).await?;

    let song = TrackId::new(format!("{}/{}", subfolder.trim_end_matches('/'), name));
    info!("Uploaded {} ({} bytes)", song, bytes.len());

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            status: "ok".to_string(),
            song,
        }),
    ))
}
