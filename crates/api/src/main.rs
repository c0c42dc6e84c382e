//! fincast API server entry point

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fincast_api::{create_router, AppState, Config};
use fincast_billing::{BillingService, EzeeClient};
use fincast_shared::db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present; deployed environments set real variables.
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fincast_api=debug,fincast_billing=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Running migrations...");
    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let gateway = EzeeClient::from_env().context("Failed to configure payment gateway")?;
    let billing = BillingService::new(gateway, pool.clone());
    let state = AppState::new(config, pool, billing);

    let addr = state.config.bind_address.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!("fincast-api listening on http://{addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
