//! Health Check API Handlers
//!
//! Liveness plus circuit breaker metrics for monitoring.

use axum::{Json, extract::State};
use conduit_core::domain::breaker::BreakerSnapshot;
use serde_json::{Value, json};

use crate::api::AppState;

/// GET /health
/// Health check endpoint
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /health/breakers
/// Current state of every circuit breaker
pub async fn breakers(State(state): State<AppState>) -> Json<Vec<BreakerSnapshot>> {
    Json(state.orchestrator.resilience().breakers().snapshot())
}
