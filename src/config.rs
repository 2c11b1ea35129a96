//! Configuration and builders for breakers and retry policies.

use std::sync::Arc;
use std::time::Duration;

use crate::breaker::CircuitBreaker;
use crate::hook::HookRegistry;
use crate::metrics::{MetricSink, NullMetricSink};
use crate::retry::RetryPolicy;

/// Default number of consecutive failures that opens the circuit.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
/// Default cooldown before an open circuit admits a trial call.
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_millis(30_000);
/// Default number of attempts, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default delay before the second attempt.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(1_000);
/// Default ceiling on any single backoff delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Immutable circuit breaker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    failure_threshold: u32,
    reset_timeout: Duration,
}

impl CircuitBreakerConfig {
    /// Creates a configuration. A threshold of zero is raised to one.
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
        }
    }

    /// Consecutive failures that open the circuit.
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// How long the circuit stays open before a trial call.
    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_RESET_TIMEOUT)
    }
}

/// Immutable retry configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryConfig {
    /// Creates a configuration with the default delay ceiling. Zero attempts is raised to one.
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Replaces the ceiling applied to later backoff delays.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Total attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the second attempt.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Ceiling on any single delay. Never below the initial delay, so the
    /// first wait is always `initial_delay`.
    pub fn max_delay(&self) -> Duration {
        self.max_delay.max(self.initial_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_INITIAL_DELAY)
    }
}

/// Builder for creating circuit breakers with custom configurations.
pub struct BreakerBuilder {
    failure_threshold: u32,
    reset_timeout: Duration,
    metric_sink: Arc<dyn MetricSink>,
    hook_registry: Arc<HookRegistry>,
}

impl Default for BreakerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            metric_sink: Arc::new(NullMetricSink),
            hook_registry: Arc::new(HookRegistry::new()),
        }
    }

    /// Sets the number of consecutive failures that opens the circuit.
    pub fn failure_threshold(mut self, count: u32) -> Self {
        self.failure_threshold = count;
        self
    }

    /// Sets how long the circuit stays open before admitting a trial call.
    pub fn reset_timeout(mut self, duration: Duration) -> Self {
        self.reset_timeout = duration;
        self
    }

    /// Applies a whole configuration at once.
    pub fn config(mut self, config: CircuitBreakerConfig) -> Self {
        self.failure_threshold = config.failure_threshold();
        self.reset_timeout = config.reset_timeout();
        self
    }

    /// Sets a metric sink for the circuit breaker.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.metric_sink = Arc::new(sink);
        self
    }

    /// Sets a metric sink shared with other components.
    pub fn shared_metric_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.metric_sink = sink;
        self
    }

    /// Sets a hook registry for the circuit breaker.
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hook_registry = Arc::new(hooks);
        self
    }

    /// Sets a hook registry shared with other components.
    pub fn shared_hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hook_registry = hooks;
        self
    }

    /// Builds the circuit breaker.
    pub fn build(self) -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitBreakerConfig::new(self.failure_threshold, self.reset_timeout),
            self.metric_sink,
            self.hook_registry,
        )
    }
}

/// Builder for retry policies.
pub struct RetryBuilder {
    config: RetryConfig,
    metric_sink: Arc<dyn MetricSink>,
}

impl Default for RetryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: RetryConfig::default(),
            metric_sink: Arc::new(NullMetricSink),
        }
    }

    /// Sets the total number of attempts, including the first.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts.max(1);
        self
    }

    /// Sets the delay before the second attempt; later delays double.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.config.initial_delay = delay;
        self
    }

    /// Sets the ceiling on any single delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    /// Applies a whole configuration at once.
    pub fn config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets a metric sink for retry events.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.metric_sink = Arc::new(sink);
        self
    }

    /// Sets a metric sink shared with other components.
    pub fn shared_metric_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.metric_sink = sink;
        self
    }

    /// Builds the retry policy.
    pub fn build(self) -> RetryPolicy {
        RetryPolicy::with_sink(self.config, self.metric_sink)
    }
}
