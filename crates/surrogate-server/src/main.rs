#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use server::{
    allocator::Allocator,
    config::{CliArgs, ServerConfig},
    service::handler::{AppState, router},
    store::SqliteStore,
    telemetry::init_telemetry,
};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    let store = SqliteStore::open(&config.database_path, config.pool_size, config.busy_timeout)?;
    let allocator = Allocator::new(store, config.max_create_attempts, config.max_random_attempts);
    let app = router(AppState::new(allocator));

    let listener = TcpListener::bind(&config.server_addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        info!("Starting id service with full config: {:#?}", config);
    } else {
        info!(
            "Starting id service on {} backed by {}",
            config.server_addr,
            config.database_path.display()
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }

    info!("Shutdown signal received, terminating gracefully...");
}
