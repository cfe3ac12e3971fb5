pub mod cli;
pub mod config;
pub mod error;
pub mod storage;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, KeysCmd};
use config::{load_config, GatewayConfig};
use otp_relay_connector::{
    controller::{ConnectionController, ControllerHandle},
    storage::{category_pattern, AuthStore},
    transport::Transport,
};
use std::sync::Arc;
use storage::SqliteAuthStore;
use tokio::signal;

/// The main entry point for the maintenance CLI.
/// This function handles CLI parsing, configuration, and command dispatch.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.command.config_path())?;
    otp_relay_logger::init(&config.gateway.log)?;
    tracing::debug!("Configuration loaded: {:#?}", &config);

    let store = SqliteAuthStore::open(&config.gateway.db_path)
        .await
        .with_context(|| format!("Failed to open auth store at '{}'", config.gateway.db_path))?;
    let result = execute(cli.command, &store).await;
    store.close().await;
    result
}

async fn execute(command: Commands, store: &SqliteAuthStore) -> Result<()> {
    match command {
        Commands::Stats(_) => {
            let stats = store.stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Keys(cmd) => {
            for key in list_keys(store, &cmd).await {
                println!("{key}");
            }
        }
        Commands::Clear(_) => {
            let removed = store.clear_all().await?;
            println!("Removed {removed} record(s) from {}", store.path().display());
        }
        Commands::Optimize(_) => {
            store.optimize().await?;
            println!("Optimized {}", store.path().display());
        }
    }
    Ok(())
}

async fn list_keys(store: &SqliteAuthStore, cmd: &KeysCmd) -> Vec<String> {
    match &cmd.prefix {
        Some(category) => store
            .list_keys_by_prefix(&category_pattern(category))
            .await
            .into_iter()
            .skip(cmd.offset.unwrap_or(0) as usize)
            .take(cmd.limit.map_or(usize::MAX, |limit| limit as usize))
            .collect(),
        None => store.list_keys(cmd.limit, cmd.offset).await,
    }
}

/// Opens the auth store, spawns the connection controller and requests the first
/// session.
///
/// The returned handle is the service's only way to reach the controller; the
/// controller task ends when [`ControllerHandle::stop`] is called or every handle
/// has been dropped.
pub async fn start(config: &GatewayConfig, transport: Arc<dyn Transport>) -> Result<ControllerHandle> {
    let store = SqliteAuthStore::open(&config.gateway.db_path)
        .await
        .with_context(|| format!("Failed to open auth store at '{}'", config.gateway.db_path))?;

    let (controller, handle) =
        ConnectionController::new(Arc::new(config.connector.clone()), transport, Arc::new(store));
    tokio::spawn(async move {
        if let Err(e) = controller.run().await {
            tracing::error!("Connection controller failed: {:?}", e);
        }
    });

    handle.connect().await?;
    Ok(handle)
}

/// Runs the service until Ctrl+C, then shuts the controller down gracefully.
pub async fn serve(config: GatewayConfig, transport: Arc<dyn Transport>) -> Result<()> {
    let handle = start(&config, transport).await?;

    match signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
            handle.stop().await;
            tracing::info!("Shutdown complete.");
        }
        Err(err) => {
            tracing::error!(error = %err, "Failed to listen for shutdown signal.");
        }
    }
    Ok(())
}
