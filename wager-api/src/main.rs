//! Price-Move Wagering API Server
//!
//! HTTP and WebSocket server for placing wagers on short-horizon crypto
//! price moves and streaming live prices.

mod routes;

use axum::{
    http::{header, Method},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wager_services::{
    CoinGeckoClient, MemoryWagerStore, PriceBroadcaster, PriceCache, ServiceConfig,
    SettlementEngine, SqliteWagerStore, TickDriver, WagerService, WagerStore,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub wager_service: Arc<WagerService>,
    pub price_cache: Arc<PriceCache>,
    pub broadcaster: Arc<PriceBroadcaster>,
    /// Which store backs the wagers ("memory" or "sqlite")
    pub store_kind: &'static str,
}

/// Build the full router for `state`
pub fn app(state: AppState) -> Router {
    // Configure CORS for frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .nest("/api", routes::api_routes())
        .merge(routes::ws_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,wager_api=debug")),
        )
        .init();

    info!("Starting Price-Move Wagering API");

    let config = ServiceConfig::from_env()?;

    if config.coingecko_api_key.is_some() {
        info!("CoinGecko API key found in environment");
    } else {
        info!("No CoinGecko API key found - using the public rate limit");
    }

    // Wager storage: SQLite when a path is configured, otherwise in-memory
    let (store, store_kind): (Arc<dyn WagerStore>, &'static str) = match &config.wager_db_path {
        Some(path) => {
            info!("Initializing wager storage at: {}", path.display());
            (Arc::new(SqliteWagerStore::new(path)?), "sqlite")
        }
        None => {
            info!("WAGER_DB_PATH not set - wagers are kept in memory only");
            (Arc::new(MemoryWagerStore::new()), "memory")
        }
    };

    // Price pipeline
    let source = CoinGeckoClient::new(
        &config.coingecko_api_base,
        config.coingecko_api_key.clone(),
        config.price_cache.fetch_timeout,
    )?;
    let price_cache = Arc::new(PriceCache::new(Arc::new(source), config.price_cache.clone()));
    let broadcaster = Arc::new(PriceBroadcaster::new());

    let driver = TickDriver::new(
        price_cache.clone(),
        broadcaster.clone(),
        SettlementEngine::new(store.clone()),
        config.driver.clone(),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let driver_handle = tokio::spawn(driver.run(shutdown_rx));

    let state = AppState {
        wager_service: Arc::new(WagerService::new(store)),
        price_cache,
        broadcaster,
        store_kind,
    };

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the tick driver once the server has drained
    let _ = shutdown_tx.send(true);
    if let Err(e) = driver_handle.await {
        error!("Tick driver task failed: {}", e);
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
