//! Bounded-retry readiness gate and retry policy.
//!
//! In a freshly started deployment the queue and cache are typically
//! reachable before the durable store finishes initializing. The readiness
//! gate blocks service entry (worker loop, producer endpoint) until a
//! lightweight probe against the store succeeds, preventing a flood of
//! failed job-record writes during the warm-up window. Exhausting the
//! configured attempts is fatal: the process must not start.
//!
//! [`RetryPolicy`] is also the configuration carrier for the worker's
//! critical-persist retries and its poll-error backoff.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

/// Fixed-delay retry policy: up to `max_attempts` tries, `delay` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts before giving up.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given attempt limit and delay.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// Error raised when a readiness probe never succeeds.
#[derive(Debug, Error)]
pub enum ReadinessError {
    /// Every attempt failed; the service must not start.
    #[error("dependency not ready after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Number of attempts made (equals the policy's `max_attempts`).
        attempts: u32,
        /// Text of the final probe failure.
        last_error: String,
    },
}

/// Repeatedly runs `probe` until it succeeds or the policy is exhausted.
///
/// Returns the 1-based attempt number on which the probe succeeded. The
/// delay is applied between attempts, not after the final failure.
pub async fn await_ready<E, F, Fut>(
    policy: &RetryPolicy,
    mut probe: F,
) -> Result<u32, ReadinessError>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let mut last_error = String::new();

    for attempt in 1..=policy.max_attempts.max(1) {
        match probe().await {
            Ok(()) => {
                info!(attempt, "dependency ready");
                return Ok(attempt);
            }
            Err(e) => {
                last_error = e.to_string();
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %last_error,
                    "dependency not ready"
                );
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    Err(ReadinessError::Exhausted {
        attempts: policy.max_attempts.max(1),
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_ready_on_first_attempt() {
        let attempts = AtomicU32::new(0);
        let result = await_ready(&fast_policy(5), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Ok::<(), String>(()) }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ready_on_nth_attempt() {
        let attempts = AtomicU32::new(0);
        let result = await_ready(&fast_policy(5), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err("connection refused".to_string())
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_after_exactly_max_attempts() {
        let attempts = AtomicU32::new(0);
        let result = await_ready(&fast_policy(4), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("still down".to_string()) }
        })
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        match result {
            Err(ReadinessError::Exhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 4);
                assert_eq!(last_error, "still down");
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_zero_attempts_probes_once() {
        let attempts = AtomicU32::new(0);
        let result = await_ready(&fast_policy(0), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Ok::<(), String>(()) }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.delay, Duration::from_secs(3));
    }
}
