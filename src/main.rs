//! # Whisper Transcription Server
//!
//! HTTP server that accepts uploaded audio files and returns their
//! transcribed text. The Whisper model is loaded exactly once at startup
//! and shared read-only by all requests; a failed load degrades the
//! process to a state where status endpoints keep answering and every
//! transcription request gets a service-unavailable error.

mod audio;
mod config;
mod error;
mod handlers;
mod health;
mod middleware;
mod staging;
mod state;
mod transcription;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcription::{Transcriber, WhisperEngine};

static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// Register every route on the service config. Shared between the server
/// and handler tests; the three structured transcription paths are alias
/// registrations of one handler.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(health::service_info))
        .route("/health", web::get().to(health::health_check))
        .route("/metrics", web::get().to(health::detailed_metrics))
        .route("/transcribe", web::post().to(handlers::transcribe))
        .route("/api/transcribe", web::post().to(handlers::transcribe))
        .route("/whisper/transcribe", web::post().to(handlers::transcribe))
        .route(
            "/v1/audio/transcriptions",
            web::post().to(handlers::transcribe_openai),
        );
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting Whisper Transcription Server v{}", env!("CARGO_PKG_VERSION"));

    // Load the model once, before the server accepts any request. Failure
    // degrades rather than crashes: status endpoints keep reporting the
    // missing model and transcription routes answer 503.
    info!("Loading Whisper model...");
    let transcriber: Option<Arc<dyn Transcriber>> =
        match WhisperEngine::initialize(&config).await {
            Ok(engine) => {
                info!("Whisper {} model loaded successfully", engine.model_size());
                Some(Arc::new(engine))
            }
            Err(e) => {
                error!("Failed to load Whisper model: {:#}", e);
                None
            }
        };

    let app_state = AppState::new(config.clone(), transcriber);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::RequestTelemetry)
            .configure(routes)
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "whisper_transcribe_server=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
