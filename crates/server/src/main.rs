use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use quotes_server::{AppState, Cli, ServerConfig};
use quotes_storage::{FileStorage, MemoryStorage, QuoteStorage};

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match ServerConfig::try_from(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(2);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(run(config)) {
        tracing::error!(error = %e, "server error");
        process::exit(1);
    }
}

async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    match &config.data_file {
        Some(path) => {
            let storage = FileStorage::open(path)?;
            let recovery = storage.recovery();
            tracing::info!(
                path = %path.display(),
                entries = recovery.entries_recovered,
                "opened file store"
            );
            start(config, Arc::new(storage)).await
        }
        None => {
            tracing::warn!("no data file configured; quotes are kept in memory only");
            start(config, Arc::new(MemoryStorage::new())).await
        }
    }
}

async fn start<S: QuoteStorage>(
    config: ServerConfig,
    storage: Arc<S>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::new(storage, &config)?);
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "quotes API listening");

    quotes_server::serve(listener, state, shutdown_signal()).await?;

    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
