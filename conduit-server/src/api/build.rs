//! Build API Handlers
//!
//! Stores definitions for by-reference runs and exposes build status.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use conduit_core::dto::build::{BuildRecord, StoreDefinition};
use conduit_engine::parser;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};
use crate::repository::build_repository;

/// PUT /builds/{customer_id}/{pipeline_name}/{build_version}
/// Store a definition and its stage selections
///
/// The definition must parse so that later runs fail only on
/// collaborator problems.
pub async fn store_definition(
    State(state): State<AppState>,
    Path((customer_id, pipeline_name, build_version)): Path<(String, String, String)>,
    Json(req): Json<StoreDefinition>,
) -> ApiResult<StatusCode> {
    tracing::info!(
        "Storing definition: {}/{}/{}",
        customer_id,
        pipeline_name,
        build_version
    );

    parser::parse(&req.definition_text)?;

    build_repository::upsert_definition(
        &state.pool,
        &customer_id,
        &pipeline_name,
        &build_version,
        &req,
    )
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /builds/{customer_id}/{pipeline_name}/{build_version}
/// Get a build record with its latest run status
pub async fn get_build(
    State(state): State<AppState>,
    Path((customer_id, pipeline_name, build_version)): Path<(String, String, String)>,
) -> ApiResult<Json<BuildRecord>> {
    tracing::debug!(
        "Getting build: {}/{}/{}",
        customer_id,
        pipeline_name,
        build_version
    );

    build_repository::find_record(&state.pool, &customer_id, &pipeline_name, &build_version)
        .await?
        .map(Json)
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "Build {}/{}/{} not found",
                customer_id, pipeline_name, build_version
            ))
        })
}
