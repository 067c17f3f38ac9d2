//! Club cache server.
//!
//! Mirrors the club's executive roster and event listings from the remote
//! page database into local JSON snapshots and image files, and serves them
//! over a small read-only HTTP API.

mod http;
mod scheduler;

use std::io;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clubcache_core::{
    CacheManager, Config, EventsPipeline, ExecutivesPipeline, NotionClient, ResizingCompressor, SyncEngine,
};

/// File name prefix for daily log files under `LOG_DIR`
const LOG_FILE_PREFIX: &str = "clubcache.log";

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g. RUST_LOG=clubcache_core=debug).
/// When `log_dir` is set, logs are also written to a daily rolling file; the
/// returned guard must live as long as the process.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();

    guard
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::from_env().context("Invalid configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());
    info!(
        data_dir = %config.data_dir.display(),
        bind_addr = %config.bind_addr,
        "Club cache starting"
    );

    let cache = CacheManager::new(&config.data_dir)?;
    let client = NotionClient::new(config.notion_token.clone())?;
    let engine = SyncEngine::new(
        Arc::new(client),
        cache.clone(),
        config.api_url.clone(),
        Arc::new(ResizingCompressor::default()),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = vec![
        scheduler::spawn(
            engine.clone(),
            ExecutivesPipeline::new(config.executives_db_id.clone(), config.roles_db_id.clone()),
            config.executives_refresh,
            shutdown_rx.clone(),
        ),
        scheduler::spawn(
            engine,
            EventsPipeline::new(config.events_db_id.clone()),
            config.events_refresh,
            shutdown_rx,
        ),
    ];

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "Listening");

    axum::serve(listener, http::build_router(cache))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    let _ = shutdown_tx.send(true);
    for worker in workers {
        if let Err(e) = worker.await {
            warn!(error = %e, "Scheduler task ended abnormally");
        }
    }

    info!("Club cache stopped");
    Ok(())
}
