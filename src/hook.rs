//! Hook registry for resilience events.
//!
//! Hooks run synchronously on the calling task after the breaker's lock has
//! been released, so a hook may query the breaker it is attached to.

use crate::state::CircuitState;
use parking_lot::RwLock;
use std::sync::Arc;

type HookFn = Arc<dyn Fn() + Send + Sync + 'static>;
type TransitionHookFn = Arc<dyn Fn(CircuitState) + Send + Sync + 'static>;

/// A registry for circuit breaker event hooks.
pub struct HookRegistry {
    on_open: RwLock<Option<TransitionHookFn>>,
    on_close: RwLock<Option<TransitionHookFn>>,
    on_half_open: RwLock<Option<TransitionHookFn>>,
    on_success: RwLock<Option<HookFn>>,
    on_failure: RwLock<Option<HookFn>>,
    on_rejected: RwLock<Option<TransitionHookFn>>,
    on_fallback: RwLock<Option<HookFn>>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self {
            on_open: RwLock::new(None),
            on_close: RwLock::new(None),
            on_half_open: RwLock::new(None),
            on_success: RwLock::new(None),
            on_failure: RwLock::new(None),
            on_rejected: RwLock::new(None),
            on_fallback: RwLock::new(None),
        }
    }

    /// Sets the hook to call when the breaker opens. It receives the previous state.
    pub fn set_on_open<F>(&self, f: F)
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        *self.on_open.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when the breaker closes. It receives the previous state.
    pub fn set_on_close<F>(&self, f: F)
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        *self.on_close.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when the breaker half-opens to admit a trial call.
    pub fn set_on_half_open<F>(&self, f: F)
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        *self.on_half_open.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when a protected call succeeds.
    pub fn set_on_success<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_success.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when a protected call fails.
    pub fn set_on_failure<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_failure.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when a call is short-circuited. It receives the rejecting state.
    pub fn set_on_rejected<F>(&self, f: F)
    where
        F: Fn(CircuitState) + Send + Sync + 'static,
    {
        *self.on_rejected.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when a fallback is invoked.
    pub fn set_on_fallback<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_fallback.write() = Some(Arc::new(f));
    }

    pub(crate) fn execute_state_transition_hook(&self, from: CircuitState, to: CircuitState) {
        let slot = match to {
            CircuitState::Open => &self.on_open,
            CircuitState::Closed => &self.on_close,
            CircuitState::HalfOpen => &self.on_half_open,
        };
        // Clone out of the slot so a hook can re-register hooks without deadlocking.
        let hook = slot.read().clone();
        if let Some(hook) = hook {
            hook(from);
        }
    }

    pub(crate) fn execute_success_hook(&self) {
        Self::fire(&self.on_success);
    }

    pub(crate) fn execute_failure_hook(&self) {
        Self::fire(&self.on_failure);
    }

    pub(crate) fn execute_fallback_hook(&self) {
        Self::fire(&self.on_fallback);
    }

    pub(crate) fn execute_rejected_hook(&self, state: CircuitState) {
        let hook = self.on_rejected.read().clone();
        if let Some(hook) = hook {
            hook(state);
        }
    }

    fn fire(slot: &RwLock<Option<HookFn>>) {
        let hook = slot.read().clone();
        if let Some(hook) = hook {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn transition_hook_receives_previous_state() {
        let hooks = HookRegistry::new();
        let seen = Arc::new(RwLock::new(Vec::new()));

        let sink = Arc::clone(&seen);
        hooks.set_on_open(move |from| sink.write().push(from));

        hooks.execute_state_transition_hook(CircuitState::Closed, CircuitState::Open);
        hooks.execute_state_transition_hook(CircuitState::HalfOpen, CircuitState::Open);
        hooks.execute_state_transition_hook(CircuitState::Open, CircuitState::HalfOpen);

        assert_eq!(
            *seen.read(),
            vec![CircuitState::Closed, CircuitState::HalfOpen]
        );
    }

    #[test]
    fn unset_hooks_are_skipped() {
        let hooks = HookRegistry::default();
        hooks.execute_success_hook();
        hooks.execute_failure_hook();
        hooks.execute_rejected_hook(CircuitState::Open);

        let fallbacks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fallbacks);
        hooks.set_on_fallback(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        hooks.execute_fallback_hook();
        assert_eq!(fallbacks.load(Ordering::SeqCst), 1);
    }
}
