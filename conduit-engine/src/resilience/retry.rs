//! Retry with exponential backoff and jitter

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{EngineError, is_transient_error};

/// Retry policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    /// Total attempts including the first
    pub max_attempts: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound on the exponential delay
    pub max_delay: Duration,

    /// Fraction of the delay added as uniform random jitter
    pub jitter_factor: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(30_000),
            jitter_factor: 0.2,
        }
    }
}

impl RetryOptions {
    /// Exponential delay after `attempt` failed attempts, before jitter
    ///
    /// `min(base * 2^(attempt-1), max)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let millis = (self.base_delay.as_millis() as u64).saturating_mul(1u64 << exponent);
        Duration::from_millis(millis).min(self.max_delay)
    }

    fn jittered(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        let factor = self.jitter_factor.clamp(0.0, 1.0);
        if factor == 0.0 {
            return delay;
        }
        let jitter = rand::random::<f64>() * delay.as_secs_f64() * factor;
        delay + Duration::from_secs_f64(jitter)
    }
}

/// Retry `op` on transient engine errors
///
/// See [`retry_with_backoff_if`].
pub async fn retry_with_backoff<T, F, Fut>(
    options: &RetryOptions,
    label: &str,
    op: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    retry_with_backoff_if(options, label, is_transient_error, op).await
}

/// Retry `op` while `retry_if` accepts its error
///
/// The last attempt, or an error `retry_if` rejects, returns immediately
/// without sleeping. The original error is returned unchanged.
pub async fn retry_with_backoff_if<T, E, F, Fut, P>(
    options: &RetryOptions,
    label: &str,
    retry_if: P,
    mut op: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = options.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(label, attempt, "Call succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                if attempt >= max_attempts || !retry_if(&e) {
                    return Err(e);
                }

                let delay = options.jittered(attempt);
                warn!(
                    label,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryOptions {
        RetryOptions {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter_factor: 0.2,
        }
    }

    fn unavailable() -> EngineError {
        EngineError::External {
            status: Some(503),
            code: None,
            message: "unavailable".to_string(),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let options = RetryOptions::default();
        assert_eq!(options.backoff(1), Duration::from_millis(1_000));
        assert_eq!(options.backoff(2), Duration::from_millis(2_000));
        assert_eq!(options.backoff(3), Duration::from_millis(4_000));
        assert_eq!(options.backoff(10), Duration::from_millis(30_000));
        assert_eq!(options.backoff(64), Duration::from_millis(30_000));
    }

    #[test]
    fn test_jitter_stays_within_factor() {
        let options = RetryOptions::default();
        for _ in 0..50 {
            let delay = options.jittered(1);
            assert!(delay >= Duration::from_millis(1_000));
            assert!(delay <= Duration::from_millis(1_200));
        }
    }

    #[tokio::test]
    async fn test_two_failures_then_success_makes_three_calls() {
        let calls = &AtomicU32::new(0);

        let result = retry_with_backoff(&fast(), "flaky", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(unavailable())
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_always_failing_returns_original_error() {
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = retry_with_backoff(&fast(), "down", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(unavailable())
        })
        .await;

        assert!(matches!(
            result,
            Err(EngineError::External {
                status: Some(503),
                ..
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = &AtomicU32::new(0);

        let result: Result<(), _> = retry_with_backoff(&fast(), "auth", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::MissingCredentials("no token".to_string()))
        })
        .await;

        assert!(matches!(result, Err(EngineError::MissingCredentials(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_custom_predicate() {
        let calls = &AtomicU32::new(0);

        let result: Result<(), String> =
            retry_with_backoff_if(&fast(), "custom", |e: &String| e == "again", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("again".to_string())
            })
            .await;

        assert_eq!(result.unwrap_err(), "again");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
