use std::sync::Arc;

use anyhow::Context;
use playpub_server::{
    api,
    config::ServerConfig,
    db,
    repository::{InMemoryJobStore, JobStore, PgJobStore},
    service::{BuildService, SweepPolicy},
    worker::Sweeper,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "playpub_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Play Store Publisher build server...");

    let config = ServerConfig::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let store = open_store(&config).await?;

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("Failed to create {}", config.upload_dir.display()))?;

    let service = Arc::new(BuildService::from_config(&config, store));

    Sweeper::new(
        Arc::clone(&service),
        SweepPolicy::from_config(&config),
        config.sweep_interval,
    )
    .spawn();

    // Build router with all API endpoints
    let app = api::create_router(service, config.max_upload_bytes);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn open_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn JobStore>> {
    let Some(database_url) = &config.database_url else {
        tracing::info!("DATABASE_URL not set, keeping builds in memory");
        return Ok(Arc::new(InMemoryJobStore::new()));
    };

    tracing::info!("Connecting to database...");

    let pool = db::create_pool(database_url)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Database connection pool created");

    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    Ok(Arc::new(PgJobStore::new(pool)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
