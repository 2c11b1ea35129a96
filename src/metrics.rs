//! Call accounting and metric sinks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::state::CircuitState;

/// Trait for metrics sinks that can receive resilience events.
pub trait MetricSink: Send + Sync + 'static {
    /// Records a breaker state transition.
    fn record_state_transition(&self, from: CircuitState, to: CircuitState);

    /// Records the outcome of a call that reached the upstream.
    fn record_call(&self, success: bool, duration: Duration);

    /// Records a short-circuited call and the state that rejected it.
    fn record_rejection(&self, state: CircuitState);

    /// Records that a fallback was invoked.
    fn record_fallback(&self);

    /// Records that attempt `attempt` failed and another will follow after `delay`.
    fn record_retry(&self, attempt: u32, delay: Duration);
}

/// A null metrics sink that discards all events.
pub struct NullMetricSink;

impl MetricSink for NullMetricSink {
    fn record_state_transition(&self, _from: CircuitState, _to: CircuitState) {}
    fn record_call(&self, _success: bool, _duration: Duration) {}
    fn record_rejection(&self, _state: CircuitState) {}
    fn record_fallback(&self) {}
    fn record_retry(&self, _attempt: u32, _delay: Duration) {}
}

/// Cumulative call counters kept beside the state machine.
#[derive(Debug, Default)]
pub(crate) struct BreakerStats {
    calls: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
    fallbacks: AtomicU64,
}

impl BreakerStats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_success(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset(&self) {
        self.calls.store(0, Ordering::Relaxed);
        self.successes.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.rejections.store(0, Ordering::Relaxed);
        self.fallbacks.store(0, Ordering::Relaxed);
    }
}

/// Counters observed by a breaker since construction or the last stats reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Calls that reached the upstream.
    pub calls: u64,
    /// Calls that succeeded.
    pub successes: u64,
    /// Calls that failed after all retries.
    pub failures: u64,
    /// Calls short-circuited without reaching the upstream.
    pub rejections: u64,
    /// Fallback invocations.
    pub fallbacks: u64,
}

impl StatsSnapshot {
    /// Fraction of upstream calls that failed, or 0 when none were made.
    pub fn error_rate(&self) -> f64 {
        if self.calls == 0 {
            return 0.0;
        }

        self.failures as f64 / self.calls as f64
    }
}

#[cfg(feature = "prometheus")]
pub use self::prometheus::PrometheusMetricSink;

#[cfg(feature = "prometheus")]
mod prometheus {
    use std::time::Duration;

    use prometheus_client::encoding::EncodeLabelSet;
    use prometheus_client::metrics::counter::Counter;
    use prometheus_client::metrics::family::Family;
    use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
    use prometheus_client::registry::Registry;

    use super::MetricSink;
    use crate::state::CircuitState;

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct TransitionLabels {
        from: String,
        to: String,
    }

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct OutcomeLabels {
        outcome: String,
    }

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct StateLabels {
        state: String,
    }

    /// Metric sink exporting to a `prometheus-client` registry.
    #[cfg_attr(docsrs, doc(cfg(feature = "prometheus")))]
    pub struct PrometheusMetricSink {
        transitions: Family<TransitionLabels, Counter>,
        calls: Family<OutcomeLabels, Counter>,
        call_duration: Histogram,
        rejections: Family<StateLabels, Counter>,
        fallbacks: Counter,
        retries: Counter,
    }

    impl PrometheusMetricSink {
        /// Creates the sink and registers its metrics under the `resilience` prefix.
        pub fn new(registry: &mut Registry) -> Self {
            let sink = Self {
                transitions: Family::default(),
                calls: Family::default(),
                call_duration: Histogram::new(exponential_buckets(0.001, 2.0, 16)),
                rejections: Family::default(),
                fallbacks: Counter::default(),
                retries: Counter::default(),
            };

            let registry = registry.sub_registry_with_prefix("resilience");
            registry.register(
                "breaker_transitions",
                "Circuit breaker state transitions",
                sink.transitions.clone(),
            );
            registry.register(
                "upstream_calls",
                "Calls that reached the upstream, by outcome",
                sink.calls.clone(),
            );
            registry.register(
                "upstream_call_duration_seconds",
                "Duration of calls that reached the upstream",
                sink.call_duration.clone(),
            );
            registry.register(
                "breaker_rejections",
                "Calls short-circuited by the breaker, by state",
                sink.rejections.clone(),
            );
            registry.register("fallbacks", "Fallback invocations", sink.fallbacks.clone());
            registry.register("retries", "Retried attempts", sink.retries.clone());

            sink
        }
    }

    impl MetricSink for PrometheusMetricSink {
        fn record_state_transition(&self, from: CircuitState, to: CircuitState) {
            self.transitions
                .get_or_create(&TransitionLabels {
                    from: from.as_str().to_owned(),
                    to: to.as_str().to_owned(),
                })
                .inc();
        }

        fn record_call(&self, success: bool, duration: Duration) {
            let outcome = if success { "success" } else { "failure" };
            self.calls
                .get_or_create(&OutcomeLabels {
                    outcome: outcome.to_owned(),
                })
                .inc();
            self.call_duration.observe(duration.as_secs_f64());
        }

        fn record_rejection(&self, state: CircuitState) {
            self.rejections
                .get_or_create(&StateLabels {
                    state: state.as_str().to_owned(),
                })
                .inc();
        }

        fn record_fallback(&self) {
            self.fallbacks.inc();
        }

        fn record_retry(&self, _attempt: u32, _delay: Duration) {
            self.retries.inc();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_count_outcomes() {
        let stats = BreakerStats::new();
        stats.record_success();
        stats.record_failure();
        stats.record_failure();
        stats.record_rejection();
        stats.record_fallback();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.calls, 3);
        assert_eq!(snapshot.successes, 1);
        assert_eq!(snapshot.failures, 2);
        assert_eq!(snapshot.rejections, 1);
        assert_eq!(snapshot.fallbacks, 1);
        assert!((snapshot.error_rate() - 2.0 / 3.0).abs() < f64::EPSILON);

        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
        assert_eq!(StatsSnapshot::default().error_rate(), 0.0);
    }
}
