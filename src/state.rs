//! Circuit breaker state machine implementation.
//!
//! [`StateMachine`] holds the mutable fields of a breaker and performs every
//! transition. It has no locking or I/O of its own: the owning
//! [`CircuitBreaker`](crate::CircuitBreaker) keeps it behind a mutex and
//! reports the [`Transition`]s it returns once the lock is released.

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Represents the possible states of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls pass through to the upstream.
    Closed,

    /// Calls are short-circuited until the cooldown elapses.
    Open,

    /// A single trial call is testing whether the upstream recovered.
    HalfOpen,
}

impl CircuitState {
    /// Lowercase label used for metrics and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        }
    }
}

impl Display for CircuitState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF-OPEN"),
        }
    }
}

/// A change of state performed by the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the change.
    pub from: CircuitState,
    /// State after the change.
    pub to: CircuitState,
}

impl Transition {
    fn new(from: CircuitState, to: CircuitState) -> Self {
        Self { from, to }
    }
}

/// Proof that a call was let through, handed back when the call completes.
///
/// The generation ties the ticket to the breaker's state between two manual
/// resets, so a call admitted before `reset()` cannot move the machine
/// as if it were the current trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ticket {
    /// Admitted while closed.
    Normal { generation: u64 },
    /// The single half-open probe.
    Trial { generation: u64 },
}

/// Result of asking the machine whether a call may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Admitted(Ticket),
    /// Short-circuited; carries the state that rejected the call.
    Rejected(CircuitState),
}

/// Point-in-time copy of a breaker's mutable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    /// Current state.
    pub state: CircuitState,
    /// Failed calls in a row while closed.
    pub consecutive_failures: u32,
    /// When the breaker last opened, if it is open or probing.
    pub opened_at: Option<Instant>,
    /// Whether a half-open trial call is running.
    pub trial_in_flight: bool,
}

/// The breaker's mutable fields and transition rules.
#[derive(Debug)]
pub(crate) struct StateMachine {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    generation: u64,
    failure_threshold: u32,
    reset_timeout: Duration,
}

impl StateMachine {
    /// Creates a closed machine.
    pub(crate) fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_in_flight: false,
            generation: 0,
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
        }
    }

    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    pub(crate) fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub(crate) fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            opened_at: self.opened_at,
            trial_in_flight: self.trial_in_flight,
        }
    }

    /// Decides whether a call issued at `now` may reach the upstream.
    ///
    /// An open breaker whose cooldown has elapsed moves to half-open here and
    /// the caller becomes the trial in the same step.
    pub(crate) fn admit(&mut self, now: Instant) -> (Admission, Option<Transition>) {
        let generation = self.generation;
        match self.state {
            CircuitState::Closed => (Admission::Admitted(Ticket::Normal { generation }), None),
            CircuitState::Open => {
                let cooled_down = self
                    .opened_at
                    .map_or(true, |opened| now.saturating_duration_since(opened) >= self.reset_timeout);
                if !cooled_down {
                    return (Admission::Rejected(CircuitState::Open), None);
                }

                self.state = CircuitState::HalfOpen;
                self.trial_in_flight = true;
                (
                    Admission::Admitted(Ticket::Trial { generation }),
                    Some(Transition::new(CircuitState::Open, CircuitState::HalfOpen)),
                )
            }
            CircuitState::HalfOpen => {
                if self.trial_in_flight {
                    (Admission::Rejected(CircuitState::HalfOpen), None)
                } else {
                    self.trial_in_flight = true;
                    (Admission::Admitted(Ticket::Trial { generation }), None)
                }
            }
        }
    }

    /// Records a successful call.
    pub(crate) fn on_success(&mut self, ticket: Ticket) -> Option<Transition> {
        if self.is_current_trial(ticket) {
            self.state = CircuitState::Closed;
            self.consecutive_failures = 0;
            self.opened_at = None;
            self.trial_in_flight = false;
            return Some(Transition::new(CircuitState::HalfOpen, CircuitState::Closed));
        }

        if self.state == CircuitState::Closed {
            self.consecutive_failures = 0;
        }
        None
    }

    /// Records a failed call completed at `now`.
    pub(crate) fn on_failure(&mut self, ticket: Ticket, now: Instant) -> Option<Transition> {
        if self.is_current_trial(ticket) {
            return Some(self.reopen(now));
        }

        if self.state != CircuitState::Closed {
            return None;
        }

        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures < self.failure_threshold {
            return None;
        }

        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        Some(Transition::new(CircuitState::Closed, CircuitState::Open))
    }

    /// Releases a call that never reported an outcome.
    ///
    /// Only an abandoned trial matters: the breaker reopens with a fresh
    /// cooldown instead of waiting forever on a probe that will not finish.
    pub(crate) fn abandon(&mut self, ticket: Ticket, now: Instant) -> Option<Transition> {
        if self.is_current_trial(ticket) {
            Some(self.reopen(now))
        } else {
            None
        }
    }

    /// Forces the machine back to closed from any state.
    pub(crate) fn reset(&mut self) -> Option<Transition> {
        let from = self.state;
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.opened_at = None;
        self.trial_in_flight = false;
        self.generation = self.generation.wrapping_add(1);

        (from != CircuitState::Closed).then(|| Transition::new(from, CircuitState::Closed))
    }

    fn is_current_trial(&self, ticket: Ticket) -> bool {
        matches!(ticket, Ticket::Trial { generation } if generation == self.generation)
            && self.state == CircuitState::HalfOpen
    }

    fn reopen(&mut self, now: Instant) -> Transition {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.trial_in_flight = false;
        Transition::new(CircuitState::HalfOpen, CircuitState::Open)
    }
}
