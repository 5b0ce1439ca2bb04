//! Run outcome DTOs
//!
//! Every invocation returns a well-formed `RunOutcome`, including runs that
//! failed before any stage was dispatched.

use serde::{Deserialize, Serialize};

use crate::domain::breaker::BreakerSnapshot;
use crate::domain::execution::{RunPhase, StageResult};

/// Result of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    /// Absent when the run failed before an id was assigned
    pub execution_id: Option<String>,
    pub status: RunStatus,
    #[serde(default)]
    pub nodes: Vec<NodeOutcome>,
    #[serde(default)]
    pub failure: Option<RunFailure>,
    /// Breaker metrics captured at the end of the invocation
    #[serde(default)]
    pub breakers: Vec<BreakerSnapshot>,
    /// Failures of best-effort side effects (status writes)
    #[serde(default)]
    pub diagnostics: Vec<String>,
}

impl RunOutcome {
    /// A run that failed at the run level in `phase`
    pub fn failed(execution_id: Option<String>, phase: RunPhase, message: impl Into<String>) -> Self {
        Self {
            execution_id,
            status: RunStatus::Failed,
            nodes: Vec::new(),
            failure: Some(RunFailure {
                phase,
                message: message.into(),
            }),
            breakers: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Success,
    Failed,
    WaitingApproval,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Success => write!(f, "SUCCESS"),
            RunStatus::Failed => write!(f, "FAILED"),
            RunStatus::WaitingApproval => write!(f, "WAITING_APPROVAL"),
        }
    }
}

/// Run-level failure with the phase it occurred in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub phase: RunPhase,
    pub message: String,
}

/// Outcome of one node of the graph
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeOutcome {
    pub node_id: String,
    pub status: NodeStatus,
    pub stages: Vec<StageOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Completed,
    Failed,
    WaitingApproval,
    NotRun,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Completed => write!(f, "COMPLETED"),
            NodeStatus::Failed => write!(f, "FAILED"),
            NodeStatus::WaitingApproval => write!(f, "WAITING_APPROVAL"),
            NodeStatus::NotRun => write!(f, "NOT_RUN"),
        }
    }
}

/// A stage and its result; `result` is absent when the stage never ran
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    pub stage_id: String,
    pub result: Option<StageResult>,
}
