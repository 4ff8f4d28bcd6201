use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gdedoctor::api::{build_router, AppState};
use gdedoctor::config::{AppConfig, LogFormat};
use gdedoctor::db;
use gdedoctor::gateway::GeocodingGateway;
use gdedoctor::geo_cache::GeocodeCache;
use gdedoctor::provider::YandexProvider;

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutdown signal received, draining connections");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = AppConfig::from_env()?;
    init_logging(config.log_format);

    info!("Starting GdeDoctor directory API v{}", env!("CARGO_PKG_VERSION"));

    if config.upstream.api_key.is_none() {
        warn!("YANDEX_API_KEY not set. Geocoding requests will fail until it is configured.");
    }

    let pool = db::connect(&config.database_path).await?;
    db::init_database_schema(&pool).await?;

    let provider = YandexProvider::new(config.upstream.clone())
        .context("Failed to build upstream HTTP client")?;
    let cache = Arc::new(GeocodeCache::new(config.gateway.cache_capacity));
    let gateway = Arc::new(GeocodingGateway::new(
        Arc::new(provider),
        cache,
        config.gateway.clone(),
    ));

    let app = build_router(AppState::new(pool.clone(), gateway));

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed")?;

    pool.close().await;
    info!("Server stopped");
    Ok(())
}
