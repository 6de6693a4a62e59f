//! Background sync daemon.
//!
//! Reads the config from `ALERTSYNC_CONFIG` (defaults when unset), opens the
//! database and runs the periodic sync until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use alertsync::{load_config, AppConfig, BackgroundSync, Database, ImapConnector, SyncService};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const CONFIG_ENV_VAR: &str = "ALERTSYNC_CONFIG";

fn init_logging() {
    // Route `log` records from the library into tracing.
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to bridge log records: {}", e);
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install tracing subscriber: {}", e);
    }
}

fn read_config() -> alertsync::Result<AppConfig> {
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(path) => {
            let path = PathBuf::from(path);
            info!("Loading config from {}", path.display());
            Ok(load_config(&path)?)
        }
        None => {
            info!("{} not set, using default config", CONFIG_ENV_VAR);
            Ok(AppConfig::default())
        }
    }
}

#[tokio::main]
async fn main() -> alertsync::Result<()> {
    init_logging();

    let config = read_config()?;
    let db = Database::open(&config.database_path)?;
    let connector = Arc::new(ImapConnector::new(config.imap.clone()));
    let service = SyncService::from_config(db, connector, &config)?;

    let cancel = CancellationToken::new();
    let handle = BackgroundSync::new(service).spawn(cancel.clone());

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
    cancel.cancel();

    match handle.await {
        Ok(cycles) => info!("Background sync finished after {} cycles", cycles),
        Err(e) => error!("Background sync task failed: {}", e),
    }
    Ok(())
}
