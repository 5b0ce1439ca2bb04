//! Circuit breaker metrics model
//!
//! Snapshots are emitted at the end of every invocation and served by the
//! server's health endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time view of one breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    /// Dependency the breaker guards (e.g. "store", "credentials")
    pub name: String,

    /// Current state
    pub state: BreakerState,

    /// Consecutive terminal failures observed
    pub failure_count: u32,

    /// Failures needed to open the breaker
    pub threshold: u32,

    /// Cool-down before a trial call is allowed
    pub reset_timeout_ms: u64,

    /// When the breaker last changed state
    pub last_transition_at: Option<DateTime<Utc>>,

    /// When the last terminal failure was recorded
    pub last_failure_at: Option<DateTime<Utc>>,
}

/// State of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    /// Calls pass through
    Closed,

    /// Calls are rejected without reaching the dependency
    Open,

    /// One trial call is allowed through
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "CLOSED"),
            BreakerState::Open => write!(f, "OPEN"),
            BreakerState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}
