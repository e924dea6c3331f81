//! AgriFund ledger service — entry point.
//!
//! Initialises the SQLite store, wires the notification sink, and serves
//! the funding/investment REST API.

use std::sync::Arc;

use reqwest::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use agrifund_ledger::api::{self, ApiState};
use agrifund_ledger::config::Config;
use agrifund_ledger::db;
use agrifund_ledger::notify::Notifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // HTTP client for outbound notification delivery.
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()?;
    let notifier = Notifier::new(client, config.notify_webhook_url.clone());

    let state = Arc::new(ApiState { pool, notifier });
    let app = api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
