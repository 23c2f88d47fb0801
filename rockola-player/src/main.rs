//! Rockola Player (rockola-player) - Main entry point
//!
//! Resolves configuration, starts the playback worker and serves the HTTP
//! API until Ctrl+C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rockola_common::config::{
    self, CliOverrides, Settings, TomlConfig, HOST_ENV_VAR, PORT_ENV_VAR,
};
use rockola_common::events::EventBus;
use rockola_player::api::{self, AppState};
use rockola_player::library::LibraryIndex;
use rockola_player::playback::{PlaybackEngine, PlaybackWorker, QueueStore};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for rockola-player
#[derive(Parser, Debug)]
#[command(name = "rockola-player")]
#[command(about = "Shared music queue player with a web control surface")]
#[command(version)]
struct Args {
    /// Address to bind
    #[arg(long, env = HOST_ENV_VAR)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = PORT_ENV_VAR)]
    port: Option<u16>,

    /// Root folder containing music files
    #[arg(short, long)]
    songs_folder: Option<PathBuf>,

    /// Folder served under /static
    #[arg(long)]
    static_folder: Option<PathBuf>,

    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset (e.g. "rockola_player=debug")
    #[arg(long)]
    log_level: Option<String>,

    /// Time tracks without opening an audio device
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_file = config::locate_config_file(args.config.as_deref())?;
    let toml_config = match &config_file {
        Some(path) => config::load_toml_config(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => TomlConfig::default(),
    };

    let settings = Settings::resolve(
        CliOverrides {
            host: args.host,
            port: args.port,
            songs_folder: args.songs_folder,
            static_folder: args.static_folder,
            log_level: args.log_level,
        },
        toml_config,
    )
    .context("Invalid configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| settings.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Rockola Player v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_file {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => warn!("No configuration file found, using defaults"),
    }

    std::fs::create_dir_all(&settings.songs_folder).with_context(|| {
        format!("Failed to create songs folder {}", settings.songs_folder.display())
    })?;
    info!("Songs folder: {}", settings.songs_folder.display());

    let library = Arc::new(LibraryIndex::new(
        settings.songs_folder.clone(),
        settings.extensions.clone(),
    ));
    let engine = build_engine(args.headless);
    let events = EventBus::new(256);
    let store = Arc::new(QueueStore::new(engine, library, events));

    let worker = PlaybackWorker::new(Arc::clone(&store)).spawn();

    let settings = Arc::new(settings);
    let app = api::build_router(AppState::new(Arc::clone(&store), Arc::clone(&settings)));

    let addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Admin page at /{}", settings.admin_path);

    api::serve(listener, app, Arc::clone(&store), shutdown_signal())
        .await
        .context("Server error")?;

    worker.await.context("Playback worker panicked")?;

    info!("Server shutdown complete");
    Ok(())
}

#[cfg(feature = "cpal-output")]
fn build_engine(headless: bool) -> Arc<dyn PlaybackEngine> {
    use rockola_player::audio::output::CpalEngine;
    use rockola_player::playback::HeadlessEngine;

    if headless {
        info!("Using headless playback engine");
        Arc::new(HeadlessEngine::new())
    } else {
        info!("Using audio device playback engine");
        Arc::new(CpalEngine::new())
    }
}

#[cfg(not(feature = "cpal-output"))]
fn build_engine(headless: bool) -> Arc<dyn PlaybackEngine> {
    use rockola_player::playback::HeadlessEngine;

    if !headless {
        warn!("Built without the cpal-output feature, tracks are timed but not heard");
    }
    Arc::new(HeadlessEngine::new())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
