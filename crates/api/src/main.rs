use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use upscaler_api::config::ServerConfig;
use upscaler_api::router::build_app_router;
use upscaler_api::state::AppState;
use upscaler_engine::{EngineCache, InterpolationLoader};
use upscaler_events::ProgressBroadcaster;
use upscaler_pipeline::{JobRunner, JobRunnerConfig, LocalArtifactStore};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "upscaler_api=debug,upscaler_pipeline=debug,upscaler_engine=info,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid server configuration");
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Artifact storage ---
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .expect("Failed to create output directory");
    let store = Arc::new(LocalArtifactStore::new(config.output_dir.clone()));
    tracing::info!(output_dir = %config.output_dir.display(), "Artifact storage ready");

    // --- Engine cache ---
    let device =
        InterpolationLoader::resolve_device(config.device).expect("Configured device unavailable");
    let loader = Arc::new(
        InterpolationLoader::new(config.weights_dir.clone())
            .with_max_output_pixels(config.max_output_pixels),
    );
    let cache = Arc::new(EngineCache::new(loader, device));
    tracing::info!(device = %device, "Engine cache created");

    // --- Progress broadcaster ---
    let broadcaster = Arc::new(ProgressBroadcaster::new(config.progress_send_timeout()));

    // --- Job runner ---
    let runner = Arc::new(JobRunner::new(
        JobRunnerConfig {
            max_concurrent_jobs: config.max_concurrent_jobs,
            default_resample_mode: config.default_resample_mode,
            max_output_pixels: config.max_output_pixels,
        },
        cache,
        Arc::clone(&broadcaster),
        store,
    ));
    tracing::info!(
        max_concurrent_jobs = config.max_concurrent_jobs,
        "Job runner started"
    );

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        runner: Arc::clone(&runner),
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let active = runner.active_jobs().await;
    tracing::info!(active, "Waiting for running jobs");
    if !runner.shutdown(config.shutdown_timeout()).await {
        tracing::warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "Jobs still running at shutdown timeout"
        );
    }

    let subscribers = broadcaster.subscriber_count().await;
    tracing::info!(subscribers, "Closing remaining progress subscriptions");
    broadcaster.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
