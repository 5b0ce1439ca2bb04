//! API Module
//!
//! HTTP API layer for the server.
//! Each submodule handles endpoints for a specific domain.

pub mod build;
pub mod error;
pub mod health;
pub mod run;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use conduit_engine::Orchestrator;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub orchestrator: Arc<Orchestrator>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health and breaker metrics
        .route("/health", get(health::health_check))
        .route("/health/breakers", get(health::breakers))
        // Run endpoints
        .route("/run", post(run::run))
        .route("/run/direct", post(run::run_direct))
        .route("/run/reference", post(run::run_by_reference))
        // Build endpoints
        .route(
            "/builds/{customer_id}/{pipeline_name}/{build_version}",
            get(build::get_build).put(build::store_definition),
        )
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
