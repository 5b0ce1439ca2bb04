//! Execution domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal outcome of a single stage
///
/// Produced exactly once per stage per attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl StageResult {
    pub fn success(duration_ms: u64, data: Option<serde_json::Value>) -> Self {
        Self {
            status: StageStatus::Success,
            message: None,
            duration_ms: Some(duration_ms),
            data,
        }
    }

    pub fn failed(message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            status: StageStatus::Failed,
            message: Some(message.into()),
            duration_ms: Some(duration_ms),
            data: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Skipped,
            message: Some(reason.into()),
            duration_ms: None,
            data: None,
        }
    }

    pub fn waiting_approval(approvers: usize) -> Self {
        Self {
            status: StageStatus::WaitingApproval,
            message: Some(format!("waiting for {} approver(s)", approvers)),
            duration_ms: None,
            data: None,
        }
    }
}

/// Stage outcome status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Success,
    Failed,
    Skipped,
    WaitingApproval,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Success => write!(f, "SUCCESS"),
            StageStatus::Failed => write!(f, "FAILED"),
            StageStatus::Skipped => write!(f, "SKIPPED"),
            StageStatus::WaitingApproval => write!(f, "WAITING_APPROVAL"),
        }
    }
}

/// Execution record persisted by the backing store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub execution_id: String,
    pub account_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Run-level status written to execution and build records
///
/// Transitions only `Running -> Success | Failed` within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }

    /// Whether moving from `self` to `next` keeps the status monotonic
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        matches!(
            (self, next),
            (ExecutionStatus::Running, ExecutionStatus::Running)
                | (ExecutionStatus::Running, ExecutionStatus::Success)
                | (ExecutionStatus::Running, ExecutionStatus::Failed)
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(ExecutionStatus::Running),
            "SUCCESS" => Ok(ExecutionStatus::Success),
            "FAILED" => Ok(ExecutionStatus::Failed),
            other => Err(format!("unknown execution status '{}'", other)),
        }
    }
}

/// Phase of a run in which a run-level failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Fetch,
    Parse,
    Resolve,
    Execute,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Fetch => write!(f, "fetch"),
            RunPhase::Parse => write!(f, "parse"),
            RunPhase::Resolve => write!(f, "resolve"),
            RunPhase::Execute => write!(f, "execute"),
        }
    }
}
