use anyhow::Context;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use report_data::api::handlers::AppState;
use report_data::api::routes::create_router_with_state;
use report_data::config::Config;
use report_data::services::adapters::builtin_adapters;
use report_data::services::{ConnectionPoolManager, ConnectorRegistry, DataSession, FetchOrCacheService};
use report_data::storage::SqliteStorage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting server on {}", config.server_address());

    // Adapter registry with the built-in sources
    let pool_manager = Arc::new(ConnectionPoolManager::with_max_size(config.pool.max_size));
    let registry = Arc::new(
        ConnectorRegistry::with_builtins(builtin_adapters(pool_manager, config.fetch.timeout())).await,
    );

    let session = DataSession::new(registry)
        .with_timeout(config.fetch.timeout())
        .with_max_concurrency(config.fetch.max_concurrency);
    if let Some(proxy) = &config.proxy {
        session.credentials().set_proxy(proxy.to_proxy_config()).await;
    }

    // Initialize SQLite cache store
    let storage = Arc::new(
        SqliteStorage::new(&config.database.url)
            .await
            .with_context(|| format!("Failed to initialize cache store at {}", config.database.url))?,
    );
    let cache = FetchOrCacheService::new(storage).with_timeout(config.fetch.timeout());

    // Create router with state
    let state = AppState::new(Arc::new(session), Arc::new(cache));
    let app: Router = create_router_with_state(state);

    // Start server
    let addr: SocketAddr = config.server_address().parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
