//! Core circuit breaker implementation.

use std::fmt::Display;
use std::future::{Future, Ready};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::{BreakerBuilder, CircuitBreakerConfig};
use crate::error::{BreakerError, BreakerResult};
use crate::hook::HookRegistry;
use crate::metrics::{BreakerStats, MetricSink, StatsSnapshot};
use crate::state::{Admission, BreakerSnapshot, CircuitState, StateMachine, Ticket, Transition};

/// Fallback type to name when calling [`CircuitBreaker::execute`] without one.
///
/// ```rust,ignore
/// breaker.execute(op, None::<NoFallback<_, _>>).await
/// ```
pub type NoFallback<T, E> = fn() -> Ready<Result<T, E>>;

/// Inner state of the circuit breaker, shared between clones.
struct BreakerInner {
    machine: Mutex<StateMachine>,
    config: CircuitBreakerConfig,
    stats: BreakerStats,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry>,
}

/// A circuit breaker that wraps calls to an unreliable upstream.
///
/// Cloning is cheap and every clone shares the same state. The state lock is
/// only held while admitting a call or recording its outcome, never while the
/// protected future runs.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker with the specified configuration and observers.
    pub fn new(
        config: CircuitBreakerConfig,
        metric_sink: Arc<dyn MetricSink>,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        let inner = BreakerInner {
            machine: Mutex::new(StateMachine::new(
                config.failure_threshold(),
                config.reset_timeout(),
            )),
            config,
            stats: BreakerStats::new(),
            metric_sink,
            hooks,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Creates a new builder for customizing a circuit breaker.
    pub fn builder() -> BreakerBuilder {
        BreakerBuilder::new()
    }

    /// The breaker's configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.inner.config
    }

    /// Gets the current state of the circuit breaker.
    ///
    /// An open breaker whose cooldown has elapsed still reports `Open` until
    /// the next call moves it to half-open.
    pub fn state(&self) -> CircuitState {
        self.inner.machine.lock().state()
    }

    /// Failed calls in a row while closed.
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.machine.lock().consecutive_failures()
    }

    /// Copies the breaker's mutable state.
    pub fn snapshot(&self) -> BreakerSnapshot {
        self.inner.machine.lock().snapshot()
    }

    /// Cumulative call counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Resets the cumulative call counters. The state machine is untouched.
    pub fn reset_stats(&self) {
        self.inner.stats.reset();
    }

    /// Forces the breaker to closed with no recorded failures.
    pub fn reset(&self) {
        let transition = self.inner.machine.lock().reset();
        match transition {
            Some(transition) => {
                tracing::info!(from = %transition.from, "circuit breaker manually reset");
                self.notify_transition(transition);
            }
            None => tracing::debug!("circuit breaker reset while already closed"),
        }
    }

    /// Executes a call wrapped by the circuit breaker.
    ///
    /// Fails with [`BreakerError::Open`] without invoking `f` while the circuit
    /// is open or another trial call is in flight.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute(f, None::<NoFallback<T, E>>).await
    }

    /// Executes a call wrapped by the circuit breaker, serving `fallback` when
    /// the call is short-circuited or fails.
    pub async fn call_with_fallback<F, Fut, G, GFut, T, E>(
        &self,
        f: F,
        fallback: G,
    ) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute(f, Some(fallback)).await
    }

    /// Executes a call with an optional fallback.
    ///
    /// The breaker counts the outcome of `f` as exactly one success or one
    /// failure. A failing fallback surfaces as [`BreakerError::Fallback`]
    /// and does not touch the breaker's accounting.
    pub async fn execute<F, Fut, G, GFut, T, E>(
        &self,
        f: F,
        fallback: Option<G>,
    ) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let ticket = match self.pre_call() {
            Ok(ticket) => ticket,
            Err(state) => return self.short_circuit(state, fallback).await,
        };

        let guard = TicketGuard::new(self, ticket);
        let start = Instant::now();
        let result = f().await;
        guard.complete();
        self.post_call(ticket, result.is_ok(), start);

        match result {
            Ok(value) => Ok(value),
            Err(err) => match fallback {
                Some(fallback) => {
                    tracing::debug!(error = %err, "protected call failed, serving fallback");
                    self.run_fallback(fallback).await
                }
                None => Err(BreakerError::Operation(err)),
            },
        }
    }

    /// Checks if a call is allowed based on the current state.
    fn pre_call(&self) -> Result<Ticket, CircuitState> {
        let (admission, transition) = self.inner.machine.lock().admit(Instant::now());

        if let Some(transition) = transition {
            tracing::info!("circuit breaker half-open, admitting trial call");
            self.notify_transition(transition);
        }

        match admission {
            Admission::Admitted(ticket) => Ok(ticket),
            Admission::Rejected(state) => Err(state),
        }
    }

    /// Records the outcome of an admitted call and reports any transition.
    fn post_call(&self, ticket: Ticket, success: bool, started: Instant) {
        let duration = started.elapsed();
        self.inner.metric_sink.record_call(success, duration);

        let transition = {
            let mut machine = self.inner.machine.lock();
            if success {
                machine.on_success(ticket)
            } else {
                machine.on_failure(ticket, Instant::now())
            }
        };

        if success {
            self.inner.stats.record_success();
            self.inner.hooks.execute_success_hook();
        } else {
            self.inner.stats.record_failure();
            self.inner.hooks.execute_failure_hook();
        }

        if let Some(transition) = transition {
            match (transition.from, transition.to) {
                (CircuitState::Closed, CircuitState::Open) => tracing::warn!(
                    failure_threshold = self.inner.config.failure_threshold(),
                    cooldown_ms = self.inner.config.reset_timeout().as_millis() as u64,
                    "circuit breaker opened, upstream calls blocked"
                ),
                (CircuitState::HalfOpen, CircuitState::Open) => tracing::warn!(
                    cooldown_ms = self.inner.config.reset_timeout().as_millis() as u64,
                    "trial call failed, circuit breaker reopened"
                ),
                (_, CircuitState::Closed) => {
                    tracing::info!("trial call succeeded, circuit breaker closed")
                }
                _ => {}
            }
            self.notify_transition(transition);
        }
    }

    /// Releases a ticket whose call was dropped before completing.
    fn abandon(&self, ticket: Ticket) {
        let transition = self.inner.machine.lock().abandon(ticket, Instant::now());
        if let Some(transition) = transition {
            tracing::warn!("trial call dropped before completing, circuit breaker reopened");
            self.notify_transition(transition);
        }
    }

    async fn short_circuit<G, GFut, T, E>(
        &self,
        state: CircuitState,
        fallback: Option<G>,
    ) -> BreakerResult<T, E>
    where
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
    {
        tracing::debug!(state = %state, "call short-circuited");
        self.inner.stats.record_rejection();
        self.inner.metric_sink.record_rejection(state);
        self.inner.hooks.execute_rejected_hook(state);

        match fallback {
            Some(fallback) => self.run_fallback(fallback).await,
            None => Err(BreakerError::Open),
        }
    }

    async fn run_fallback<G, GFut, T, E>(&self, fallback: G) -> BreakerResult<T, E>
    where
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
    {
        self.inner.stats.record_fallback();
        self.inner.metric_sink.record_fallback();
        self.inner.hooks.execute_fallback_hook();

        fallback().await.map_err(BreakerError::Fallback)
    }

    // Execute hooks outside the lock path
    fn notify_transition(&self, transition: Transition) {
        self.inner
            .metric_sink
            .record_state_transition(transition.from, transition.to);
        self.inner
            .hooks
            .execute_state_transition_hook(transition.from, transition.to);
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("config", &self.inner.config)
            .field("state", &self.snapshot())
            .finish()
    }
}

/// Hands an admitted ticket back to the breaker if the call future is dropped.
struct TicketGuard<'a> {
    breaker: &'a CircuitBreaker,
    ticket: Ticket,
    armed: bool,
}

impl<'a> TicketGuard<'a> {
    fn new(breaker: &'a CircuitBreaker, ticket: Ticket) -> Self {
        Self {
            breaker,
            ticket,
            armed: true,
        }
    }

    fn complete(mut self) {
        self.armed = false;
    }
}

impl Drop for TicketGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.abandon(self.ticket);
        }
    }
}
