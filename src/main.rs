//! Klaxon server binary.
//!
//! Hosts the webhook ingestion endpoint and the alert query API. The store
//! is constructed once here and handed to the handlers by state; nothing
//! opens connections implicitly at import time.
//!
//! # API Endpoints
//!
//! - `POST /webhook/alert` - Ingest an alert group
//! - `GET /api/alerts` - List alerts (filter by severity/status)
//! - `GET /api/alerts/{alert_id}` - One alert plus its audit trail
//! - `PUT /api/alerts/{alert_id}/status` - Apply a lifecycle transition
//! - `POST /api/alerts/{alert_id}/ticket` - Record an external ticket link
//! - `GET /api/stats` - Aggregate counts
//! - `GET /health` - Health check

use std::env;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use klaxon::api::{AppState, router};
use klaxon::store::AlertStore;

/// Default port if not specified via environment variable.
const DEFAULT_PORT: u16 = 8080;

/// Default database path if not specified via environment variable.
const DEFAULT_DB_PATH: &str = "sqlite:klaxon.db?mode=rwc";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with environment filter
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("klaxon=info".parse()?))
        .init();

    // Load configuration from environment
    let port: u16 = env::var("KLAXON_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let db_url = env::var("KLAXON_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

    info!(port, db_url = %db_url, "Starting Klaxon server");

    // Initialize storage
    let store = AlertStore::new(&db_url).await?;
    info!("Database initialized");

    // Build router
    let state = AppState { store };
    let app = router(state).layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Klaxon is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
