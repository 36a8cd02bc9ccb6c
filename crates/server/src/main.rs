mod auth;
mod config;
mod error;
mod routes;
mod state;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;

use config::Config;
use hub::Hub;
use ledger::PgLedger;
use state::AppState;

#[tokio::main]
async fn main() {
    telemetry::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.max_db_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    sqlx::migrate!("../ledger/migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    let ledger = Arc::new(PgLedger::new(pool));
    let hub = Hub::spawn();
    let state = AppState { ledger, hub };

    let app = routes::router(state)
        .layer(middleware::from_fn(auth::inject_caller_id))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .unwrap_or_else(|err| panic!("failed to bind {}: {err}", config.bind_addr));
    tracing::info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutting down");
}
