//! Bounded retry with exponential backoff.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{RetryBuilder, RetryConfig};
use crate::metrics::{MetricSink, NullMetricSink};

struct RetryInner {
    config: RetryConfig,
    metric_sink: Arc<dyn MetricSink>,
}

/// Re-runs a failing operation up to a fixed number of attempts.
///
/// The delay before attempt `k + 2` is `initial_delay * 2^k`, capped at the
/// configured ceiling. Waiting is a `tokio` sleep, so other tasks keep running.
/// Operations must be safe to repeat.
#[derive(Clone)]
pub struct RetryPolicy {
    inner: Arc<RetryInner>,
}

impl RetryPolicy {
    /// Creates a policy that reports to no metric sink.
    pub fn new(config: RetryConfig) -> Self {
        Self::with_sink(config, Arc::new(NullMetricSink))
    }

    /// Creates a policy reporting retries to `metric_sink`.
    pub fn with_sink(config: RetryConfig, metric_sink: Arc<dyn MetricSink>) -> Self {
        Self {
            inner: Arc::new(RetryInner {
                config,
                metric_sink,
            }),
        }
    }

    /// Creates a new builder for customizing a retry policy.
    pub fn builder() -> RetryBuilder {
        RetryBuilder::new()
    }

    /// The policy's configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.inner.config
    }

    /// Delay slept after the failed attempt with zero-based index `attempt_index`.
    pub fn delay_for_attempt(&self, attempt_index: u32) -> Duration {
        let config = &self.inner.config;
        config
            .initial_delay()
            .saturating_mul(2u32.saturating_pow(attempt_index))
            .min(config.max_delay())
    }

    /// Runs `operation` until it succeeds or the attempts are used up.
    ///
    /// Returns the first success, or the error from the final attempt.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_counted(operation).await.0
    }

    /// Like [`execute`](Self::execute), also returning how many attempts ran.
    pub async fn execute_counted<F, Fut, T, E>(&self, mut operation: F) -> (Result<T, E>, u32)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let max_attempts = self.inner.config.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(attempt, "operation succeeded after retry");
                    }
                    return (Ok(value), attempt);
                }
                Err(err) if attempt < max_attempts => {
                    let delay = self.delay_for_attempt(attempt - 1);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "attempt failed, retrying"
                    );
                    self.inner.metric_sink.record_retry(attempt, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::warn!(attempts = attempt, error = %err, "retry attempts exhausted");
                    return (Err(err), attempt);
                }
            }
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_from_initial() {
        let policy = RetryPolicy::new(RetryConfig::new(5, Duration::from_millis(1_000)));

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(4_000));
    }

    #[test]
    fn delays_are_capped() {
        let policy = RetryPolicy::builder()
            .max_attempts(10)
            .initial_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(500))
            .build();

        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(500));
    }

    #[test]
    fn first_delay_is_never_capped() {
        let config = RetryConfig::new(3, Duration::from_secs(60));
        assert_eq!(RetryPolicy::new(config).delay_for_attempt(0), Duration::from_secs(60));

        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_secs(60))
            .build();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(60));

        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(250))
            .max_delay(Duration::ZERO)
            .build();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(250));
        assert_eq!(policy.config().max_delay(), Duration::from_millis(250));
    }

    #[test]
    fn zero_attempts_means_one() {
        let policy = RetryPolicy::builder().max_attempts(0).build();
        assert_eq!(policy.config().max_attempts(), 1);
    }
}
