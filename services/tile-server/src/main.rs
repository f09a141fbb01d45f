use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use tile_server::{router, state, Args, Config, LogFormat};
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = Config::load(&args)?;
    init_tracing(&config.log_level, args.log_format.unwrap_or(LogFormat::Json))?;

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    config.prepare_dirs()?;
    info!(
        production = config.production,
        workers = config.workers(),
        data_dir = %config.data_dir.display(),
        "Starting tile server"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (app_state, coordinator) =
        state::build(&config, &shutdown_tx, Some(prometheus_handle)).await?;

    let coordinator_handle = tokio::spawn(coordinator.run(shutdown_tx.subscribe()));

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
        signal_tx.send(()).ok();
    });

    let app = router(app_state);
    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.listen_addr))?;
    info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let mut server_shutdown = shutdown_tx.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            server_shutdown.recv().await.ok();
        })
        .await?;

    coordinator_handle.await.ok();
    info!("Tile server stopped");
    Ok(())
}
