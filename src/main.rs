use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use ladder_backend::api::{self, AppState};
use ladder_backend::config::Config;
use ladder_backend::db::Database;
use ladder_backend::metrics;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load();
    metrics::register_metrics();

    let db = Database::connect(&config.database_url, config.db_max_connections)
        .await
        .expect("Failed to initialize database");
    let db = Arc::new(db);

    let state = AppState::new(db, &config);
    state
        .recorder
        .ensure_tournament(&config.default_tournament)
        .await
        .expect("Failed to create default tournament");

    let app = api::router(state).layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!("Ladder backend listening on {addr}");
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
