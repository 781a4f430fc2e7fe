//! ranksync-scraper - ranking service sync daemon
//!
//! Runs a qualified loop and a ranked loop per enabled ranking service
//! against the shared catalog database, and serves `/health`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ranksync_common::catalog::SourceKind;
use ranksync_common::config::load_config;
use ranksync_common::events::{EventBus, EventSink};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ranksync_scraper::scheduler::{spawn_source_loops, LoopRegistry};
use ranksync_scraper::{build_router, sources, AppState};

/// Command-line arguments for ranksync-scraper
#[derive(Parser, Debug)]
#[command(name = "ranksync-scraper")]
#[command(about = "Keeps catalog ranking data in sync with the ranking services")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "RANKSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Catalog database path (overrides the config file)
    #[arg(short, long, env = "RANKSYNC_DATABASE_PATH")]
    database: Option<PathBuf>,

    /// Health endpoint host (overrides the config file)
    #[arg(long, env = "RANKSYNC_HOST")]
    host: Option<String>,

    /// Health endpoint port (overrides the config file)
    #[arg(short, long, env = "RANKSYNC_PORT")]
    port: Option<u16>,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(database) = args.database {
        config.database_path = database;
    }
    if let Some(host) = args.host {
        config.listen_host = host;
    }
    if let Some(port) = args.port {
        config.listen_port = port;
    }

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ranksync-scraper");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());

    let pool = ranksync_scraper::db::init_database(&config.database_path)
        .await
        .context("Failed to open catalog database")?;

    let event_bus = EventBus::new(1024);
    let mut events = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(envelope) => {
                    debug!(topic = %envelope.topic, routing_key = %envelope.routing_key, "Catalog change");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Change log subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
    let sink: Arc<dyn EventSink> = Arc::new(event_bus);

    let registry = LoopRegistry::new();
    let cancel = CancellationToken::new();
    let mut loops = Vec::new();

    for kind in SourceKind::ALL {
        let source_config = config.sources.for_source(kind);
        if !source_config.enabled {
            info!(source = %kind, "Source disabled");
            continue;
        }

        let client = sources::client_for(kind, source_config)
            .with_context(|| format!("Failed to build {} client", kind))?;

        loops.extend(spawn_source_loops(
            pool.clone(),
            client,
            source_config,
            &config.scheduler,
            Arc::clone(&sink),
            registry.clone(),
            cancel.clone(),
        ));
        info!(source = %kind, base_url = %source_config.base_url, "Sync loops started");
    }

    if loops.is_empty() {
        warn!("No ranking source enabled, only serving /health");
    }

    let app = build_router(AppState::new(registry));

    let addr = format!("{}:{}", config.listen_host, config.listen_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Health check: http://{}/health", addr);

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .context("Server error")?;

    // Loops stop at their next sleep; a running cycle completes first
    cancel.cancel();
    for handle in loops {
        if let Err(e) = handle.await {
            warn!("Sync loop task ended abnormally: {}", e);
        }
    }

    pool.close().await;
    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
