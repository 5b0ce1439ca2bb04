//! Run API Handlers
//!
//! Every run endpoint answers with a `RunOutcome`, including runs that
//! failed before any stage was dispatched.

use axum::{Json, extract::State};
use conduit_core::dto::invocation::{DirectInvocation, Invocation, ReferenceInvocation};
use conduit_core::dto::run::RunOutcome;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// POST /run
/// Run either invocation shape
pub async fn run(
    State(state): State<AppState>,
    Json(invocation): Json<Invocation>,
) -> ApiResult<Json<RunOutcome>> {
    match &invocation {
        Invocation::Direct(direct) => validate_direct(direct)?,
        Invocation::ByReference(reference) => validate_reference(reference)?,
    }

    Ok(Json(state.orchestrator.run(invocation).await))
}

/// POST /run/direct
/// Run an already-parsed pipeline
pub async fn run_direct(
    State(state): State<AppState>,
    Json(invocation): Json<DirectInvocation>,
) -> ApiResult<Json<RunOutcome>> {
    validate_direct(&invocation)?;
    tracing::info!("Direct run requested: {}", invocation.execution_id);

    Ok(Json(state.orchestrator.run_direct(invocation).await))
}

/// POST /run/reference
/// Run a stored definition
pub async fn run_by_reference(
    State(state): State<AppState>,
    Json(invocation): Json<ReferenceInvocation>,
) -> ApiResult<Json<RunOutcome>> {
    validate_reference(&invocation)?;
    tracing::info!(
        "By-reference run requested: {}/{}/{}",
        invocation.customer_id,
        invocation.pipeline_name,
        invocation.build_version
    );

    Ok(Json(state.orchestrator.run_by_reference(invocation).await))
}

fn validate_direct(invocation: &DirectInvocation) -> ApiResult<()> {
    if invocation.execution_id.trim().is_empty() {
        return Err(ApiError::BadRequest("executionId is required".to_string()));
    }
    if invocation.account_id.trim().is_empty() {
        return Err(ApiError::BadRequest("accountId is required".to_string()));
    }
    Ok(())
}

fn validate_reference(invocation: &ReferenceInvocation) -> ApiResult<()> {
    let fields = [
        ("customerId", &invocation.customer_id),
        ("pipelineName", &invocation.pipeline_name),
        ("buildVersion", &invocation.build_version),
    ];
    match fields.iter().find(|(_, value)| value.trim().is_empty()) {
        Some((name, _)) => Err(ApiError::BadRequest(format!("{} is required", name))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_requires_every_key() {
        let mut invocation = ReferenceInvocation {
            customer_id: "acct".to_string(),
            pipeline_name: "release".to_string(),
            build_version: "1.4.0".to_string(),
        };
        assert!(validate_reference(&invocation).is_ok());

        invocation.build_version = " ".to_string();
        assert!(matches!(
            validate_reference(&invocation),
            Err(ApiError::BadRequest(msg)) if msg == "buildVersion is required"
        ));
    }
}
