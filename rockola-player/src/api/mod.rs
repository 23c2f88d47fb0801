//! HTTP API
//!
//! JSON endpoints under `/api`, the SSE stream, and the two embedded pages.

pub mod handlers;
pub mod sse;
pub mod ui;
pub mod upload;

use crate::library::LibraryIndex;
use crate::playback::QueueStore;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use rockola_common::config::Settings;
use rockola_common::events::EventBus;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<QueueStore>,
    pub library: Arc<LibraryIndex>,
    pub events: EventBus,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(store: Arc<QueueStore>, settings: Arc<Settings>) -> Self {
        Self {
            library: Arc::clone(store.library()),
            events: store.events().clone(),
            store,
            settings,
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let admin_route = format!("/{}", state.settings.admin_path);
    let body_limit = state.settings.max_upload_bytes;
    let static_folder = state.settings.static_folder.clone();

    let mut router = Router::new()
        // Pages
        .route("/", get(ui::index_page))
        .route(&admin_route, get(ui::admin_page))
        // Health
        .route("/health", get(handlers::health))
        // Library
        .route("/api/songs", get(handlers::list_songs))
        .route("/api/upload", post(upload::upload_song))
        // Queue
        .route(
            "/api/queue",
            get(handlers::get_queue)
                .post(handlers::enqueue)
                .delete(handlers::remove_from_queue),
        )
        .route("/api/queue/move", post(handlers::move_in_queue))
        .route("/api/queue/duration", get(handlers::queue_duration))
        // SSE event stream
        .route("/api/events", get(sse::event_stream));

    if let Some(folder) = static_folder {
        if folder.is_dir() {
            info!("Serving static assets from {}", folder.display());
            router = router.nest_service("/static", ServeDir::new(folder));
        } else {
            warn!("Static folder {} does not exist, not serving /static", folder.display());
        }
    }

    router
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        // Enable CORS for browser access from other origins
        .layer(CorsLayer::permissive())
}

/// Serve `router` until `signal` resolves.
///
/// The queue is shut down as soon as the signal fires, before in-flight
/// requests drain: playback stops and open event streams end.
pub async fn serve<F>(
    listener: TcpListener,
    router: Router,
    store: Arc<QueueStore>,
    signal: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            signal.await;
            store.shutdown();
        })
        .await
}
