use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use basket_service::app::{build_notifier, build_router, AppState, Backends};
use basket_service::config::load_service_config;
use basket_service::metrics::ServiceMetrics;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_service_config()?;

    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to Postgres")?;

    let notifier = build_notifier(&config)?;
    let metrics = Arc::new(ServiceMetrics::new()?);
    let backends = Backends::postgres(db_pool.clone(), notifier);

    let ip: std::net::IpAddr = config
        .host
        .parse()
        .with_context(|| format!("Invalid HOST '{}'", config.host))?;
    let addr = SocketAddr::from((ip, config.port));

    let state = AppState::new(db_pool, config, metrics, backends)?;
    let app = build_router(state);

    info!(%addr, "starting basket-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
