//! Resilience layer
//!
//! Every collaborator and external tool call goes through
//! [`Resilience::call`]: retries run inside the dependency's circuit
//! breaker, so the breaker only observes fully-retried outcomes.

mod breaker;
mod retry;

pub use breaker::{BreakerConfig, CircuitBreaker};
pub use retry::{RetryOptions, retry_with_backoff, retry_with_backoff_if};

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use conduit_core::domain::breaker::BreakerSnapshot;
use tracing::info;

use crate::error::EngineError;

/// Named external dependency with its own breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dependency {
    Store,
    Credentials,
    Connectors,
    Environments,
    IssueTracker,
    SourceControl,
    IntegrationPlatform,
}

impl Dependency {
    pub const ALL: [Dependency; 7] = [
        Dependency::Store,
        Dependency::Credentials,
        Dependency::Connectors,
        Dependency::Environments,
        Dependency::IssueTracker,
        Dependency::SourceControl,
        Dependency::IntegrationPlatform,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dependency::Store => "store",
            Dependency::Credentials => "credentials",
            Dependency::Connectors => "connectors",
            Dependency::Environments => "environments",
            Dependency::IssueTracker => "issue-tracker",
            Dependency::SourceControl => "source-control",
            Dependency::IntegrationPlatform => "integration-platform",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide breaker registry, one breaker per dependency
///
/// Built once by the composition root and shared by `Arc`.
#[derive(Debug)]
pub struct Breakers {
    store: CircuitBreaker,
    credentials: CircuitBreaker,
    connectors: CircuitBreaker,
    environments: CircuitBreaker,
    issue_tracker: CircuitBreaker,
    source_control: CircuitBreaker,
    integration_platform: CircuitBreaker,
}

impl Breakers {
    pub fn new(config: BreakerConfig) -> Self {
        let make = |dep: Dependency| CircuitBreaker::new(dep.as_str(), config.clone());
        Self {
            store: make(Dependency::Store),
            credentials: make(Dependency::Credentials),
            connectors: make(Dependency::Connectors),
            environments: make(Dependency::Environments),
            issue_tracker: make(Dependency::IssueTracker),
            source_control: make(Dependency::SourceControl),
            integration_platform: make(Dependency::IntegrationPlatform),
        }
    }

    pub fn get(&self, dependency: Dependency) -> &CircuitBreaker {
        match dependency {
            Dependency::Store => &self.store,
            Dependency::Credentials => &self.credentials,
            Dependency::Connectors => &self.connectors,
            Dependency::Environments => &self.environments,
            Dependency::IssueTracker => &self.issue_tracker,
            Dependency::SourceControl => &self.source_control,
            Dependency::IntegrationPlatform => &self.integration_platform,
        }
    }

    /// Metrics of every breaker, in a stable order
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        Dependency::ALL
            .iter()
            .map(|dep| self.get(*dep).snapshot())
            .collect()
    }
}

impl Default for Breakers {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

/// Retry policy plus the shared breakers
#[derive(Debug, Clone)]
pub struct Resilience {
    breakers: Arc<Breakers>,
    retry: RetryOptions,
}

impl Resilience {
    pub fn new(breakers: Arc<Breakers>, retry: RetryOptions) -> Self {
        Self { breakers, retry }
    }

    /// Call `op` with retries inside the breaker for `dependency`
    pub async fn call<T, F, Fut>(
        &self,
        dependency: Dependency,
        label: &str,
        op: F,
    ) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        self.breakers
            .get(dependency)
            .execute(|| retry_with_backoff(&self.retry, label, op))
            .await
    }

    pub fn breakers(&self) -> &Arc<Breakers> {
        &self.breakers
    }

    /// Snapshot every breaker and emit one metrics line each
    pub fn emit_metrics(&self) -> Vec<BreakerSnapshot> {
        let snapshots = self.breakers.snapshot();
        for s in &snapshots {
            info!(
                breaker = %s.name,
                state = %s.state,
                failure_count = s.failure_count,
                last_transition_at = ?s.last_transition_at,
                "Circuit breaker metrics"
            );
        }
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::domain::breaker::BreakerState;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn resilience(threshold: u32) -> Resilience {
        Resilience::new(
            Arc::new(Breakers::new(BreakerConfig {
                failure_threshold: threshold,
                reset_timeout: Duration::from_secs(30),
            })),
            RetryOptions {
                max_attempts: 3,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(2),
                jitter_factor: 0.0,
            },
        )
    }

    #[test]
    fn test_snapshot_names_every_dependency() {
        let names: Vec<String> = Breakers::default()
            .snapshot()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "store",
                "credentials",
                "connectors",
                "environments",
                "issue-tracker",
                "source-control",
                "integration-platform"
            ]
        );
    }

    #[tokio::test]
    async fn test_breaker_counts_fully_retried_failures_only() {
        let resilience = resilience(2);
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = resilience
            .call(Dependency::Credentials, "find_credential", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(EngineError::External {
                    status: Some(503),
                    code: None,
                    message: "unavailable".to_string(),
                })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let snapshot = resilience.breakers().get(Dependency::Credentials).snapshot();
        assert_eq!(snapshot.failure_count, 1);
        assert_eq!(snapshot.state, BreakerState::Closed);
        assert_eq!(
            resilience.breakers().get(Dependency::Store).snapshot().failure_count,
            0
        );
    }

    #[tokio::test]
    async fn test_open_breaker_rejects_without_retrying() {
        let resilience = resilience(1);
        let calls = &AtomicU32::new(0);

        let _: Result<(), _> = resilience
            .call(Dependency::Store, "fetch", || async {
                Err(EngineError::External {
                    status: Some(500),
                    code: None,
                    message: "down".to_string(),
                })
            })
            .await;

        let rejected: Result<(), _> = resilience
            .call(Dependency::Store, "fetch", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(rejected, Err(EngineError::BreakerOpen(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
