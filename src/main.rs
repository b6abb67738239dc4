//! Donkey Engine - channel-based message routing runtime
//!
//! This is the main entry point for the `donkey-engine` server process.

use anyhow::{Context, Result};
use donkey::channel::Channel;
use donkey::config::EngineConfig;
use donkey::database::{DatabaseConfig, DatabaseConnection, DatabasePath};
use donkey::domain_types::ServerId;
use donkey::engine::Engine;
use donkey::observability::EventBus;
use donkey::rest_api::{AppState, create_app};
use donkey::vm_router::VmRouter;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("donkey=info".parse()?),
        )
        .init();

    info!("starting donkey engine");

    let config_path = std::env::var("DONKEY_CONFIG").unwrap_or_else(|_| "donkey.toml".to_string());
    let config_toml = std::fs::read_to_string(&config_path)
        .with_context(|| format!("reading config file {config_path}"))?;
    let config = EngineConfig::parse(&config_toml).context("parsing engine config")?;

    let database_path = DatabasePath::new(&config.database_path)
        .map_err(|error| anyhow::anyhow!("invalid database path: {error}"))?;
    let connection = DatabaseConnection::initialize(DatabaseConfig::new(database_path))
        .await
        .context("initializing database")?;

    let server_id = ServerId::generate();
    let engine = Arc::new(Engine::new(connection, server_id));
    let vm_router = Arc::new(VmRouter::new());

    for channel_config in &config.channels {
        let enabled = channel_config.enabled;
        let name = channel_config.name.clone();
        let channel = Channel::build(
            channel_config.clone(),
            server_id,
            engine.dao_for_new_channel(),
            engine.content_store_for_new_channel(),
            engine.statistics_store_for_new_channel(),
            EventBus::new(),
            Arc::clone(&vm_router),
            reqwest::Client::new(),
        )
        .with_context(|| format!("building channel '{name}'"))?;
        let id = channel.config.id;
        engine.deploy(channel).await.with_context(|| format!("deploying channel '{name}'"))?;
        if enabled {
            engine
                .start_and_drive(id)
                .await
                .with_context(|| format!("starting channel '{name}'"))?;
        }
        info!(%id, %name, "channel configured");
    }

    let state = AppState { engine: Arc::clone(&engine), vm_router, http_client: reqwest::Client::new() };
    let app = create_app(state);

    let addr: SocketAddr = config.bind_address.parse().context("parsing bind address")?;
    let (listener, actual_addr) = donkey::server::bind(addr).await.context("binding REST API listener")?;
    info!(%actual_addr, "REST API listening");

    if let Err(error) = donkey::server::serve(listener, app).await {
        error!(%error, "server exited with an error");
        return Err(error.into());
    }

    info!("donkey engine shutting down gracefully");
    Ok(())
}
