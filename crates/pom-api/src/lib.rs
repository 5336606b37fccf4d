//! Persistence of Memory API /v1: REST endpoints for the proof workflow
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod service;

pub use service::ProofService;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use pom_core::Config;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub type AppState = Arc<ProofService>;

pub fn create_app(state: AppState) -> Router {
    let body_limit = state.body_limit();
    Router::new()
        .route("/v1/proofs", post(handlers::start_proof))
        .route("/v1/proofs/{id}", get(handlers::get_proof))
        .route("/v1/proofs/{id}/challenge", post(handlers::issue_challenge))
        .route("/v1/proofs/{id}/confirm", post(handlers::confirm_challenge))
        .route("/v1/proofs/{id}/revoke", post(handlers::revoke))
        .route("/v1/fingerprints/{digest}", get(handlers::get_fingerprint))
        .route("/v1/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(middleware::request_context))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::cors())
        .with_state(state)
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    let service = ProofService::from_config(&config)?;
    let app = create_app(Arc::new(service));
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;

    tracing::info!(addr = %config.listen_addr, version = pom_core::POM_VERSION, "pom api listening");
    axum::serve(listener, app).await?;
    Ok(())
}
