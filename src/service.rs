//! The resilient-call façade used by the rest of an application.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::breaker::NoFallback;
use crate::error::{BreakerError, BreakerResult};
use crate::factory::ResilienceFactory;
use crate::state::CircuitState;

const MESSAGE_CLOSED: &str = "Circuit CLOSED: operating normally";
const MESSAGE_OPEN: &str = "Circuit OPEN: using fallback data, calls blocked";
const MESSAGE_HALF_OPEN: &str = "Circuit HALF-OPEN: testing recovery";
const MESSAGE_FORCED: &str = "Forced fallback mode: upstream calls disabled";

/// Resilience status reported to callers and status pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResilienceStatus {
    /// State of the shared breaker.
    pub circuit_state: CircuitState,
    /// True exactly when the breaker is open.
    pub is_fallback_mode: bool,
    /// Human-readable summary.
    pub status_message: String,
    /// True when forced fallback mode is configured.
    pub forced_fallback: bool,
}

impl ResilienceStatus {
    /// Derives the status for a breaker state.
    pub fn from_state(circuit_state: CircuitState, forced_fallback: bool) -> Self {
        let status_message = if forced_fallback {
            MESSAGE_FORCED
        } else {
            match circuit_state {
                CircuitState::Closed => MESSAGE_CLOSED,
                CircuitState::Open => MESSAGE_OPEN,
                CircuitState::HalfOpen => MESSAGE_HALF_OPEN,
            }
        };

        Self {
            circuit_state,
            is_fallback_mode: circuit_state == CircuitState::Open,
            status_message: status_message.to_owned(),
            forced_fallback,
        }
    }
}

/// Where the value of a resilient call came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueSource {
    /// The upstream operation.
    Primary,
    /// The caller's fallback.
    Fallback,
}

/// Outcome of [`ResilienceService::execute_reported`].
#[derive(Debug)]
pub struct ResilientReport<T, E> {
    /// The call's result.
    pub result: BreakerResult<T, E>,
    /// Whether the fallback was invoked.
    pub source: ValueSource,
    /// Breaker state right after the call.
    pub circuit_state: CircuitState,
    /// Upstream attempts made; zero when short-circuited.
    pub attempts: u32,
}

/// Runs calls through the shared retry policy and circuit breaker.
///
/// Retries happen inside the breaker's protected call, so a burst of transient
/// failures that ends in success counts as one success, and exhausted retries
/// count as one failure.
#[derive(Debug, Clone)]
pub struct ResilienceService {
    factory: Arc<ResilienceFactory>,
}

impl ResilienceService {
    /// Creates a service over a shared factory.
    pub fn new(factory: Arc<ResilienceFactory>) -> Self {
        Self { factory }
    }

    /// The factory providing the shared components.
    pub fn factory(&self) -> &Arc<ResilienceFactory> {
        &self.factory
    }

    /// Current status of the shared breaker.
    pub fn status(&self) -> ResilienceStatus {
        let state = self.factory.circuit_breaker().state();
        ResilienceStatus::from_state(state, self.factory.settings().force_fallback)
    }

    /// Forces the shared breaker back to closed.
    pub fn reset_circuit_breaker(&self) {
        self.factory.reset_circuit_breaker();
    }

    /// Runs `operation` with retries inside the breaker, without a fallback.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> BreakerResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_resilient(operation, None::<NoFallback<T, E>>)
            .await
    }

    /// Runs `operation` with retries inside the breaker, serving `fallback`
    /// when the breaker blocks the call or the retries are exhausted.
    pub async fn call_with_fallback<F, Fut, G, GFut, T, E>(
        &self,
        operation: F,
        fallback: G,
    ) -> BreakerResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_resilient(operation, Some(fallback)).await
    }

    /// Runs `operation` with retries inside the breaker and an optional fallback.
    ///
    /// In forced fallback mode the operation is never attempted.
    pub async fn execute_resilient<F, Fut, G, GFut, T, E>(
        &self,
        operation: F,
        fallback: Option<G>,
    ) -> BreakerResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: Display,
    {
        if self.factory.settings().force_fallback {
            return self.forced_fallback(fallback).await;
        }

        let breaker = self.factory.circuit_breaker();
        let retry_policy = self.factory.retry_policy();

        breaker
            .execute(move || retry_policy.execute(operation), fallback)
            .await
    }

    /// Like [`execute_resilient`](Self::execute_resilient), also reporting where
    /// the value came from and how many upstream attempts were made.
    pub async fn execute_reported<F, Fut, G, GFut, T, E>(
        &self,
        operation: F,
        fallback: Option<G>,
    ) -> ResilientReport<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let breaker = self.factory.circuit_breaker();
        let attempts = AtomicU32::new(0);
        let used_fallback = AtomicBool::new(false);

        let fallback = fallback.map(|fallback| {
            let used_fallback = &used_fallback;
            move || {
                used_fallback.store(true, Ordering::Relaxed);
                fallback()
            }
        });

        let result = if self.factory.settings().force_fallback {
            self.forced_fallback(fallback).await
        } else {
            let retry_policy = self.factory.retry_policy();
            let attempts = &attempts;
            breaker
                .execute(
                    move || async move {
                        let (result, made) = retry_policy.execute_counted(operation).await;
                        attempts.store(made, Ordering::Relaxed);
                        result
                    },
                    fallback,
                )
                .await
        };

        ResilientReport {
            result,
            source: if used_fallback.load(Ordering::Relaxed) {
                ValueSource::Fallback
            } else {
                ValueSource::Primary
            },
            circuit_state: breaker.state(),
            attempts: attempts.load(Ordering::Relaxed),
        }
    }

    /// Binds `operation` and its `fallback` to the shared components.
    ///
    /// Every [`ResilientOperation::call`] runs the operation with retries
    /// inside the breaker and hands the same arguments to the fallback when
    /// the upstream is blocked or keeps failing.
    pub fn make_resilient<F, G>(
        &self,
        name: &'static str,
        operation: F,
        fallback: G,
    ) -> ResilientOperation<F, G> {
        ResilientOperation {
            service: self.clone(),
            name,
            operation,
            fallback,
        }
    }

    async fn forced_fallback<G, GFut, T, E>(&self, fallback: Option<G>) -> BreakerResult<T, E>
    where
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T, E>>,
    {
        tracing::debug!("forced fallback mode, upstream call skipped");
        match fallback {
            Some(fallback) => fallback().await.map_err(BreakerError::Fallback),
            None => Err(BreakerError::ForcedOpen),
        }
    }
}

/// An upstream operation wrapped by [`ResilienceService::make_resilient`].
#[derive(Clone)]
pub struct ResilientOperation<F, G> {
    service: ResilienceService,
    name: &'static str,
    operation: F,
    fallback: G,
}

impl<F, G> ResilientOperation<F, G> {
    /// Name used in log events.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Calls the wrapped operation with `args`.
    ///
    /// The arguments are cloned for each attempt and for the fallback.
    pub async fn call<A, Fut, GFut, T, E>(&self, args: A) -> BreakerResult<T, E>
    where
        A: Clone,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: Fn(A) -> GFut,
        GFut: Future<Output = Result<T, E>>,
        E: Display,
    {
        tracing::trace!(operation = self.name, "resilient call");
        let fallback_args = args.clone();
        self.service
            .call_with_fallback(
                || (self.operation)(args.clone()),
                || (self.fallback)(fallback_args),
            )
            .await
    }
}

impl<F, G> std::fmt::Debug for ResilientOperation<F, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientOperation")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
