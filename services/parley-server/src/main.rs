//! Parley server
//!
//! Wires the store, the completion provider, and the run manager into the
//! HTTP surface: instance lifecycle routes plus the SSE progress relay.

mod auth;
mod config;
mod error;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use parley_db::{Database, DatabaseConfig};
use parley_engine::{EngineConfig, NegotiationEngine, RunManager};
use parley_llm::CompletionRouter;

use crate::auth::StaticTokenVerifier;
use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("parley_server=info,parley_engine=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    let db = Database::connect(&DatabaseConfig::from_env()).await?;
    db.migrate().await?;

    let llm = CompletionRouter::from_env();
    info!(provider = %llm.kind(), "completion provider selected");

    let engine = Arc::new(NegotiationEngine::new(
        db.clone(),
        llm.provider(),
        EngineConfig::from_env(),
    ));
    let runs = Arc::new(RunManager::new(engine));

    let state = AppState {
        db: db.clone(),
        runs: runs.clone(),
        verifier: Arc::new(StaticTokenVerifier::from_env()),
        config: Arc::new(config.clone()),
    };

    // Prune stale usage counters in the background
    let usage_db = db.clone();
    let retention_days = config.usage_retention_days;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(6 * 60 * 60));
        loop {
            interval.tick().await;
            match usage_db.usage_repo().cleanup(retention_days).await {
                Ok(0) => {}
                Ok(n) => info!(pruned = n, "cleaned up old usage counters"),
                Err(e) => warn!(error = %e, "usage cleanup failed"),
            }
        }
    });

    let app = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Parley server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(runs))
        .await?;

    Ok(())
}

async fn shutdown_signal(runs: Arc<RunManager>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, aborting live negotiations");
    runs.abort_all();
}
