//! Shared provisioning of the breaker and retry policy.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::breaker::CircuitBreaker;
use crate::error::ConfigError;
use crate::hook::HookRegistry;
use crate::metrics::{MetricSink, NullMetricSink};
use crate::retry::RetryPolicy;
use crate::settings::ResilienceSettings;

/// Builds, on first use, the one breaker and one retry policy that every
/// protected call shares.
///
/// The factory is an ordinary value: construct it once in the application's
/// composition root and pass it around behind an `Arc`.
pub struct ResilienceFactory {
    settings: ResilienceSettings,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry>,
    breaker: OnceCell<CircuitBreaker>,
    retry_policy: OnceCell<RetryPolicy>,
}

impl ResilienceFactory {
    /// Creates a factory without metrics or hooks.
    pub fn new(settings: ResilienceSettings) -> Self {
        Self::builder(settings).build()
    }

    /// Creates a factory from environment settings.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(ResilienceSettings::from_env()?))
    }

    /// Starts a builder for attaching observers.
    pub fn builder(settings: ResilienceSettings) -> FactoryBuilder {
        FactoryBuilder {
            settings,
            metric_sink: Arc::new(NullMetricSink),
            hooks: Arc::new(HookRegistry::new()),
        }
    }

    /// Settings the components are built from.
    pub fn settings(&self) -> &ResilienceSettings {
        &self.settings
    }

    /// The shared circuit breaker, built on first call.
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        self.breaker.get_or_init(|| {
            let config = self.settings.breaker_config();
            tracing::debug!(
                failure_threshold = config.failure_threshold(),
                reset_timeout_ms = config.reset_timeout().as_millis() as u64,
                "building shared circuit breaker"
            );
            CircuitBreaker::builder()
                .config(config)
                .shared_metric_sink(Arc::clone(&self.metric_sink))
                .shared_hooks(Arc::clone(&self.hooks))
                .build()
        })
    }

    /// The shared retry policy, built on first call.
    pub fn retry_policy(&self) -> &RetryPolicy {
        self.retry_policy.get_or_init(|| {
            let config = self.settings.retry_config();
            tracing::debug!(
                max_attempts = config.max_attempts(),
                initial_delay_ms = config.initial_delay().as_millis() as u64,
                "building shared retry policy"
            );
            RetryPolicy::builder()
                .config(config)
                .shared_metric_sink(Arc::clone(&self.metric_sink))
                .build()
        })
    }

    /// Whether the shared breaker has been built yet.
    pub fn is_breaker_built(&self) -> bool {
        self.breaker.get().is_some()
    }

    /// Forces the shared breaker back to closed.
    pub fn reset_circuit_breaker(&self) {
        self.circuit_breaker().reset();
    }
}

impl std::fmt::Debug for ResilienceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceFactory")
            .field("settings", &self.settings)
            .field("breaker", &self.breaker.get())
            .field("retry_policy", &self.retry_policy.get())
            .finish()
    }
}

/// Builder attaching metric sinks and hooks to a [`ResilienceFactory`].
pub struct FactoryBuilder {
    settings: ResilienceSettings,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry>,
}

impl FactoryBuilder {
    /// Sets the metric sink shared by the breaker and the retry policy.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.metric_sink = Arc::new(sink);
        self
    }

    /// Sets a metric sink the caller keeps a handle to.
    pub fn shared_metric_sink(mut self, sink: Arc<dyn MetricSink>) -> Self {
        self.metric_sink = sink;
        self
    }

    /// Sets the breaker's hook registry.
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Builds the factory. Nothing is constructed until first use.
    pub fn build(self) -> ResilienceFactory {
        ResilienceFactory {
            settings: self.settings,
            metric_sink: self.metric_sink,
            hooks: self.hooks,
            breaker: OnceCell::new(),
            retry_policy: OnceCell::new(),
        }
    }
}
