//! # Wyoming Whisper - Main Application Entry Point
//!
//! A Wyoming protocol speech-to-text server. Clients (Home Assistant, voice
//! satellites) stream audio over TCP or a unix socket and receive a
//! transcript for every utterance. Recognition runs Whisper on Candle.
//!
//! ## Application Architecture:
//! - **protocol**: Wyoming events, framing and the capability payload
//! - **audio**: Normalization to 16kHz mono, utterance buffer, WAV container
//! - **transcription**: Speech engine trait, Whisper model, utterance pipeline
//! - **session / handler**: Per-connection state and event dispatch
//! - **server**: Listener and connection tasks
//! - **config / cli**: Layered configuration
//! - **health / state**: Optional HTTP health endpoint and shared counters

mod audio;          // Audio normalization and buffering (audio/ directory)
mod cli;            // Command line flags (cli.rs)
mod config;         // Configuration management (config.rs)
mod device;         // Compute device selection (device.rs)
mod error;          // Error handling types (error.rs)
mod handler;        // Wyoming event dispatcher (handler.rs)
mod health;         // Health check endpoints (health.rs)
mod protocol;       // Wyoming protocol (protocol/ directory)
mod server;         // Socket server (server.rs)
mod session;        // Per-connection session (session.rs)
mod state;          // Shared counters and health state (state.rs)
mod transcription;  // Speech-to-text (transcription/ directory)

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use crate::config::{AppConfig, LogFormat};
use protocol::Info;
use server::WyomingServer;
use session::SessionConfig;
use state::{AppState, ServerStats};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use transcription::{SpeechEngine, WhisperEngine};

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from defaults, file, environment and flags
/// 2. **Sets up logging** according to `--debug` and `--log-format`
/// 3. **Builds the capability payload** once for all connections
/// 4. **Loads the Whisper model** (downloading it on first run)
/// 5. **Serves Wyoming clients** (and optionally /health) until SIGINT/SIGTERM
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli).context("Invalid configuration")?;

    init_tracing(config.logging.debug, config.logging.format)?;
    info!("Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    tracing::debug!("Configuration: {:?}", config);

    let uri = config.listen_uri()?;
    let model: Arc<str> = Arc::from(config.model.name.as_str());
    let info_event = Arc::new(Info::for_model(&model, env!("CARGO_PKG_VERSION")).to_event()?);

    let whisper = WhisperEngine::load(&config.transcription()?)
        .await
        .context("Failed to load speech engine")?;
    info!("Models ready: {}", whisper.model_ids().collect::<Vec<_>>().join(", "));
    let engine: Arc<dyn SpeechEngine> = Arc::new(whisper);

    let stats = Arc::new(ServerStats::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_signal_listener(shutdown_tx);

    let health = match &config.server.health_addr {
        Some(addr) => {
            let state = AppState::new(
                Arc::clone(&stats),
                Arc::clone(&info_event),
                Arc::clone(&model),
                uri.to_string(),
            );
            let server = health::run_health_server(addr, state)
                .with_context(|| format!("Failed to bind health server on {}", addr))?;
            info!("Health endpoint on http://{}/health", addr);
            let handle = server.handle();
            tokio::spawn(async move {
                if let Err(e) = server.await {
                    error!("Health server error: {}", e);
                }
            });
            Some(handle)
        }
        None => None,
    };

    let session_config = SessionConfig {
        model,
        info: info_event,
    };
    let server = WyomingServer::new(uri, session_config, engine, stats);
    let result = server.run(wait_for_shutdown(shutdown_rx)).await;

    if let Some(handle) = health {
        handle.stop(true).await;
    }

    result?;
    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize the tracing subscriber.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Overrides the filter entirely (e.g. `wyoming_whisper=trace`)
/// - Otherwise `--debug` enables DEBUG for this crate and INFO elsewhere
fn init_tracing(debug: bool, format: LogFormat) -> Result<()> {
    let default_filter = if debug {
        "wyoming_whisper=debug,info"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Full => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

/// Flip the shutdown flag on SIGINT or SIGTERM.
fn spawn_signal_listener(shutdown: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => info!("Received SIGINT"),
                        _ = sigterm.recv() => info!("Received SIGTERM"),
                    }
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    if ctrl_c.await.is_ok() {
                        info!("Received SIGINT");
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            if ctrl_c.await.is_ok() {
                info!("Received Ctrl-C");
            }
        }

        let _ = shutdown.send(true);
    });
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            // Sender dropped without signalling; keep serving
            std::future::pending::<()>().await;
        }
    }
}
