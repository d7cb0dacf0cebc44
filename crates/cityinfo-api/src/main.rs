//! # cityinfo-api: Binary Entry Point
//!
//! Reads configuration from the environment, assembles diagnostics, opens
//! the repository, boots the service and serves it on `PORT` (default 8080).

use std::net::SocketAddr;
use std::sync::Arc;

use cityinfo_api::bootstrap::Boot;
use cityinfo_api::config::AppConfig;
use cityinfo_api::db::PgCityInfoRepository;
use cityinfo_api::diagnostics::{Diagnostics, DiagnosticsConfig};
use cityinfo_core::{CityInfoRepository, InMemoryRepository, RepositoryError};
use tracing::instrument::WithSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    let (diagnostics, worker) = DiagnosticsConfig::assemble(
        &config.environment,
        config.telemetry_key.as_ref(),
        &config.telemetry_endpoint,
    )?
    .build()?;
    let dispatch = diagnostics.dispatch().clone();

    if let Some(worker) = worker {
        tokio::spawn(worker.run().with_subscriber(dispatch.clone()));
    }

    serve(config, diagnostics).with_subscriber(dispatch).await
}

async fn serve(config: AppConfig, diagnostics: Diagnostics) -> Result<(), Box<dyn std::error::Error>> {
    let repository = open_repository(&config).await.map_err(|e| {
        tracing::error!("Repository initialization failed: {e}");
        e
    })?;

    let port = config.port;
    let state = Boot::new(config)
        .repository(repository)
        .diagnostics(diagnostics)
        .build()
        .map_err(|e| {
            tracing::error!("Bootstrap failed: {e}");
            e
        })?;

    let app = cityinfo_api::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("City Info API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// `memory:` selects the seeded in-memory store; anything else is a
/// Postgres connection string.
async fn open_repository(
    config: &AppConfig,
) -> Result<Arc<dyn CityInfoRepository>, RepositoryError> {
    let url = config.database_url.expose();
    if url.trim().starts_with("memory:") {
        tracing::warn!("Using the in-memory repository. State will not survive restarts.");
        return Ok(Arc::new(InMemoryRepository::seeded()));
    }
    let repository = PgCityInfoRepository::connect(url).await?;
    repository.ensure_schema().await?;
    repository.seed_if_empty().await?;
    Ok(Arc::new(repository))
}
