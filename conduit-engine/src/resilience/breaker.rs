//! Circuit breaker
//!
//! CLOSED until `failure_threshold` consecutive terminal failures, then OPEN.
//! OPEN rejects without calling until `reset_timeout` has passed since the
//! last failure, then lets exactly one trial through as HALF_OPEN. The trial
//! closes the breaker on success and reopens it on failure.
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! await point.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use conduit_core::domain::breaker::{BreakerSnapshot, BreakerState};
use tracing::{info, warn};

use crate::error::EngineError;

/// Thresholds for a circuit breaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    last_transition_at: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

impl Inner {
    fn transition(&mut self, name: &str, next: BreakerState) {
        if self.state == next {
            return;
        }
        info!(breaker = name, from = %self.state, to = %next, "Circuit breaker transition");
        self.state = next;
        self.last_transition_at = Some(Utc::now());
    }
}

/// Circuit breaker guarding one named dependency
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
                last_failure_at: None,
                last_transition_at: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Run `op` through the breaker
    ///
    /// `op` should already contain its retries; the breaker sees only the
    /// final outcome. Rejected calls return [`EngineError::BreakerOpen`]
    /// without invoking `op`.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, EngineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let mut permit = self.acquire()?;
        let result = op().await;

        match &result {
            Ok(_) => self.on_success(),
            Err(e) if e.counts_against_breaker() => self.on_failure(e),
            // The dependency answered; the caller's request was the problem
            Err(_) => self.on_success(),
        }
        permit.completed = true;

        result
    }

    /// Point-in-time metrics
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            threshold: self.config.failure_threshold,
            reset_timeout_ms: self.config.reset_timeout.as_millis() as u64,
            last_transition_at: inner.last_transition_at,
            last_failure_at: inner.last_failure_at,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn acquire(&self) -> Result<Permit<'_>, EngineError> {
        let mut inner = self.lock();

        match inner.state {
            BreakerState::Closed => Ok(Permit::new(self, false)),
            BreakerState::Open => {
                let cooled_down = inner
                    .last_failure
                    .is_none_or(|at| at.elapsed() >= self.config.reset_timeout);
                if !cooled_down {
                    return Err(EngineError::BreakerOpen(self.name.clone()));
                }
                inner.transition(&self.name, BreakerState::HalfOpen);
                inner.trial_in_flight = true;
                Ok(Permit::new(self, true))
            }
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(EngineError::BreakerOpen(self.name.clone()));
                }
                inner.trial_in_flight = true;
                Ok(Permit::new(self, true))
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        inner.failure_count = 0;
        inner.trial_in_flight = false;
        inner.transition(&self.name, BreakerState::Closed);
    }

    fn on_failure(&self, error: &EngineError) {
        let mut inner = self.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        inner.last_failure_at = Some(Utc::now());
        inner.trial_in_flight = false;

        let should_open = inner.state == BreakerState::HalfOpen
            || inner.failure_count >= self.config.failure_threshold;

        if should_open && inner.state != BreakerState::Open {
            warn!(
                breaker = %self.name,
                failures = inner.failure_count,
                error = %error,
                "Circuit breaker opening"
            );
            inner.transition(&self.name, BreakerState::Open);
        }
    }
}

/// Admission for one call; frees a half-open trial slot if the call is dropped
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    completed: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            completed: false,
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.completed {
            self.breaker.lock().trial_in_flight = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::{Barrier, oneshot};

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            "issue-tracker",
            BreakerConfig {
                failure_threshold: 5,
                reset_timeout: Duration::from_millis(20),
            },
        )
    }

    fn failure() -> EngineError {
        EngineError::External {
            status: Some(500),
            code: None,
            message: "boom".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fifth_failure_opens_and_sixth_is_rejected() {
        let breaker = breaker();
        let calls = &AtomicU32::new(0);

        for i in 1..=5 {
            let result: Result<(), _> = breaker
                .execute(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(failure())
                })
                .await;
            assert!(matches!(result, Err(EngineError::External { .. })));

            let expected = if i < 5 {
                BreakerState::Closed
            } else {
                BreakerState::Open
            };
            assert_eq!(breaker.state(), expected);
        }

        let rejected: Result<(), _> = breaker
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(rejected, Err(EngineError::BreakerOpen(name)) if name == "issue-tracker"));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(breaker.snapshot().failure_count, 5);
    }

    #[tokio::test]
    async fn test_trial_success_after_timeout_closes() {
        let breaker = breaker();
        for _ in 0..5 {
            let _: Result<(), _> = breaker.execute(|| async { Err(failure()) }).await;
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;

        let result = breaker.execute(|| async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.state, BreakerState::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert!(snapshot.last_transition_at.is_some());
    }

    #[tokio::test]
    async fn test_trial_failure_reopens() {
        let breaker = breaker();
        for _ in 0..5 {
            let _: Result<(), _> = breaker.execute(|| async { Err(failure()) }).await;
        }

        tokio::time::sleep(Duration::from_millis(30)).await;

        let _: Result<(), _> = breaker.execute(|| async { Err(failure()) }).await;
        assert_eq!(breaker.state(), BreakerState::Open);

        let rejected: Result<(), _> = breaker.execute(|| async { Ok(()) }).await;
        assert!(matches!(rejected, Err(EngineError::BreakerOpen(_))));
    }

    #[tokio::test]
    async fn test_not_found_does_not_count() {
        let breaker = breaker();
        for _ in 0..10 {
            let _: Result<(), _> = breaker
                .execute(|| async { Err(EngineError::NotFound("credential".to_string())) })
                .await;
        }

        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.snapshot().failure_count, 0);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let breaker = breaker();
        for _ in 0..4 {
            let _: Result<(), _> = breaker.execute(|| async { Err(failure()) }).await;
        }
        breaker.execute(|| async { Ok(()) }).await.unwrap();

        assert_eq!(breaker.snapshot().failure_count, 0);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_failures_are_all_counted() {
        const CALLS: usize = 32;
        let breaker = Arc::new(CircuitBreaker::new(
            "store",
            BreakerConfig {
                failure_threshold: CALLS as u32,
                reset_timeout: Duration::from_secs(30),
            },
        ));
        // Every call is admitted before any of them fails
        let barrier = Arc::new(Barrier::new(CALLS));

        let handles: Vec<_> = (0..CALLS)
            .map(|_| {
                let breaker = breaker.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    breaker
                        .execute(move || async move {
                            barrier.wait().await;
                            Err::<(), _>(failure())
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            let result = handle.await.unwrap();
            assert!(matches!(result, Err(EngineError::External { .. })));
        }

        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.failure_count, CALLS as u32);
        assert_eq!(snapshot.state, BreakerState::Open);
    }

    #[tokio::test]
    async fn test_single_half_open_trial_and_dropped_trial_frees_slot() {
        let breaker = Arc::new(breaker());
        for _ in 0..5 {
            let _: Result<(), _> = breaker.execute(|| async { Err(failure()) }).await;
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        let (started_tx, started_rx) = oneshot::channel();
        let trial = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .execute(move || async move {
                        let _ = started_tx.send(());
                        std::future::pending::<Result<(), EngineError>>().await
                    })
                    .await
            })
        };
        started_rx.await.unwrap();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        let calls = &AtomicU32::new(0);
        let rejected: Result<(), _> = breaker
            .execute(move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(rejected, Err(EngineError::BreakerOpen(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        trial.abort();
        assert!(trial.await.unwrap_err().is_cancelled());

        breaker.execute(|| async { Ok(()) }).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
