//! Server-Sent Events (SSE) stream
//!
//! Streams queue and playback events to connected browsers. Each stream
//! ends when the queue shuts down so graceful shutdown can drain.

use crate::api::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

/// GET /api/events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(
        "New SSE client connected ({} subscribers)",
        state.events.subscriber_count() + 1
    );

    let store = Arc::clone(&state.store);
    let closed = async move { store.closed().await };

    let stream = BroadcastStream::new(state.events.subscribe()).filter_map(|result| async move {
        match result {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => Some(Ok(Event::default().event(event.event_type()).data(json))),
                Err(e) => {
                    warn!("Failed to serialize event: {}", e);
                    None
                }
            },
            Err(e) => {
                // Lagged: this client missed events; it resyncs on the next QueueChanged
                warn!("SSE client fell behind: {}", e);
                None
            }
        }
    })
    .take_until(closed);

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
