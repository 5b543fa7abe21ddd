use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use convoy::cli::Cli;
use convoy::config::Config;
use convoy::engine::{
    spawn_reconciler_task, BatchExecutor, ChannelQueue, ContinuationWorker, OrderLocks,
    OrderService, Reconciler,
};
use convoy::upstream::{HttpUpstream, Upstreams};
use convoy::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;
    config.validate()?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if cli.command.is_some() {
        return convoy::cli::run_command(&cli).await;
    }

    tracing::info!("Starting convoy v{}", env!("CARGO_PKG_VERSION"));

    // Ensure data directory exists
    std::fs::create_dir_all(&config.server.data_dir)?;

    // Initialize database
    let db = convoy::db::init(&config.server.data_dir).await?;

    let metrics_handle = convoy::api::metrics::init_metrics()?;

    // Collaborator services and the continuation queue
    let http = Arc::new(HttpUpstream::new(&config.upstream)?);
    let (queue, queue_rx) = ChannelQueue::new(config.orchestrator.queue_capacity);
    let upstreams = Upstreams::from_http(http, Arc::new(queue));

    let locks = Arc::new(OrderLocks::new());
    let executor = Arc::new(BatchExecutor::new(db.clone(), upstreams.clone()));
    let orders = Arc::new(OrderService::new(
        db.clone(),
        upstreams.clone(),
        locks.clone(),
        executor,
    ));

    // Worker that submits the next batch of advanced orders
    let worker = ContinuationWorker::new(queue_rx, orders.clone());
    tokio::spawn(async move {
        worker.run().await;
    });

    let reconciler = Arc::new(Reconciler::new(
        db.clone(),
        upstreams,
        locks,
        &config.orchestrator,
    ));
    spawn_reconciler_task(reconciler, &config.orchestrator);

    let state = Arc::new(
        AppState::new(config.clone(), db, orders).with_metrics(metrics_handle),
    );
    let app = convoy::api::create_router(state);

    // Start API server
    let api_addr = format!("{}:{}", config.server.host, config.server.api_port);
    let listener = tokio::net::TcpListener::bind(&api_addr).await?;

    tracing::info!("API server listening on http://{}", api_addr);
    tracing::info!("Upstream gateway: {}", config.upstream.base_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
