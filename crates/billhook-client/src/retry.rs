//! Retry-with-backoff policy shared by every outbound CRM call.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};

/// Retry policy configuration.
///
/// One instance is shared by all call sites so attempt counts and the
/// delay curve are a single tested unit rather than per-call ad-hoc
/// loops.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Delay cap.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given retry count and base delay. The
    /// delay cap defaults to 30 seconds.
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Whether the error should be retried at the given attempt number.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &ApiError) -> bool {
        attempt < self.max_retries && error.is_retryable()
    }

    /// Backoff delay for the given attempt: `base * 2^attempt`, capped.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        exponential.min(self.max_delay)
    }

    /// Run an async operation with retry.
    ///
    /// The closure is called until it succeeds, returns a
    /// non-retryable error, or the retry budget is spent. Exhaustion
    /// fails with [`ApiError::RetriesExhausted`] carrying the last
    /// observed error.
    pub async fn execute<F, Fut, T>(&self, operation: &str, mut f: F) -> ApiResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = ApiResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempt = attempt + 1, "Succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !self.should_retry(attempt, &error) {
                        if attempt >= self.max_retries && error.is_retryable() {
                            warn!(
                                operation,
                                attempts = attempt + 1,
                                error = %error,
                                "Retry budget spent"
                            );
                            return Err(ApiError::RetriesExhausted {
                                attempts: attempt + 1,
                                message: error.to_string(),
                            });
                        }
                        return Err(error);
                    }

                    let delay = self.delay_for(attempt);
                    debug!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying after transient error"
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> ApiError {
        ApiError::Http {
            status: 503,
            body: "unavailable".into(),
        }
    }

    #[test]
    fn test_delay_exponential_and_capped() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1));
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(9), Duration::from_secs(30)); // capped
    }

    #[test]
    fn test_should_retry_bounds() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        assert!(policy.should_retry(0, &transient()));
        assert!(policy.should_retry(1, &transient()));
        assert!(!policy.should_retry(2, &transient()));
    }

    #[test]
    fn test_should_not_retry_client_error() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let err = ApiError::Http {
            status: 400,
            body: "bad request".into(),
        };
        assert!(!policy.should_retry(0, &err));
    }

    #[tokio::test]
    async fn test_execute_succeeds_first_try() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let result = policy
            .execute("test_op", || async { Ok::<_, ApiError>(7) })
            .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_execute_succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = policy
            .execute("test_op", move || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(transient())
                    } else {
                        Ok(99)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 99);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_execute_non_retryable_fails_immediately() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result: ApiResult<()> = policy
            .execute("test_op", move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(ApiError::Http {
                        status: 404,
                        body: "not found".into(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(ApiError::Http { status: 404, .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_exhaustion_carries_last_error() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result: ApiResult<()> = policy
            .execute("test_op", move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(transient())
                }
            })
            .await;

        match result {
            Err(ApiError::RetriesExhausted { attempts, message }) => {
                assert_eq!(attempts, 3); // 1 initial + 2 retries
                assert!(message.contains("503"));
            }
            other => panic!("Expected RetriesExhausted, got: {other:?}"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
