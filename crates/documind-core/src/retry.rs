//! Reusable retry-with-backoff policy for outbound service calls.
//!
//! The format converter retries its remote call with this policy; the OCR
//! and archive clients intentionally do not (their calls are billed per
//! invocation, and blind retries risk duplicate cost).

use std::future::Future;
use std::time::Duration;

/// Retry policy with linearly increasing backoff: the delay before attempt
/// `n` (1-based) is `n * base_delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Run `op` until it succeeds or the attempt budget is exhausted,
    /// returning the last error. The closure receives the 1-based attempt
    /// number. Attempts are independent; no state carries over.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    tracing::warn!(
                        attempt = attempt,
                        max_attempts = attempts,
                        error = %err,
                        "Attempt failed"
                    );
                    last_err = Some(err);
                    if attempt < attempts {
                        tokio::time::sleep(self.base_delay * attempt).await;
                    }
                }
            }
        }

        Err(last_err.expect("at least one attempt was made"))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_always_failing_op_is_attempted_exactly_max_times() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = fast_policy(3)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("remote unavailable".to_string()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_success_short_circuits_remaining_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = fast_policy(3)
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_first_attempt_success_makes_one_call() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, &str> = fast_policy(3)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("done") }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_clamps_to_one() {
        let calls = AtomicU32::new(0);
        let _: Result<(), String> = fast_policy(0)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("nope".to_string()) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backoff_grows_linearly() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10));
        let start = std::time::Instant::now();
        let _: Result<(), &str> = policy.run(|_| async { Err("fail") }).await;
        // Delays: 10ms after attempt 1, 20ms after attempt 2 = 30ms minimum.
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}
